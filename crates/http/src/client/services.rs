//! One client per backend, all sharing a single session
//!
//! The dashboard talks to several services on different base URLs. Building
//! them through [`ServiceSet`] puts every client behind the same
//! [`SessionCoordinator`], so a burst of 401s spread across services still
//! triggers a single refresh.

use super::{ApiClient, ClientError, SessionCoordinator, SessionSink, SessionStore};
use harvest_core::ClientConfig;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Backend services of the admin dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Authentication service
    Auth,
    /// Order tracking
    Orders,
    /// Categories and products
    Catalog,
    /// Root admin API
    Admin,
}

impl Service {
    /// Every service, in a stable order
    pub const ALL: [Self; 4] = [Self::Auth, Self::Orders, Self::Catalog, Self::Admin];

    /// Configuration key of the service
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Orders => "orders",
            Self::Catalog => "catalog",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Ok(Self::Auth),
            "orders" => Ok(Self::Orders),
            "catalog" | "products" | "categories" => Ok(Self::Catalog),
            "admin" | "root" => Ok(Self::Admin),
            other => Err(ClientError::Configuration(format!(
                "unknown service '{other}' (expected auth, orders, catalog or admin)"
            ))),
        }
    }
}

/// Clients for every backend, sharing one coordinator
#[derive(Debug, Clone)]
pub struct ServiceSet {
    auth: ApiClient,
    orders: ApiClient,
    catalog: ApiClient,
    admin: ApiClient,
    coordinator: Arc<SessionCoordinator>,
}

impl ServiceSet {
    /// Build the coordinator and all clients from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configured URL is invalid
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn SessionSink>,
    ) -> Result<Self, ClientError> {
        let coordinator = SessionCoordinator::builder()
            .refresh_url(&config.refresh_url)
            .refresh_timeout(config.refresh_timeout())
            .user_agent(&config.user_agent)
            .store(store)
            .sink(sink)
            .build()?;

        Self::with_coordinator(config, Arc::new(coordinator))
    }

    /// Build all clients on an existing coordinator
    ///
    /// # Errors
    ///
    /// Returns an error if any configured base URL is invalid
    pub fn with_coordinator(
        config: &ClientConfig,
        coordinator: Arc<SessionCoordinator>,
    ) -> Result<Self, ClientError> {
        let build = |base_url: &str| {
            ApiClient::builder()
                .base_url(base_url)
                .timeout(config.timeout())
                .user_agent(&config.user_agent)
                .coordinator(Arc::clone(&coordinator))
                .build()
        };

        Ok(Self {
            auth: build(&config.services.auth)?,
            orders: build(&config.services.orders)?,
            catalog: build(&config.services.catalog)?,
            admin: build(&config.services.admin)?,
            coordinator: Arc::clone(&coordinator),
        })
    }

    /// Client for `service`
    pub const fn client(&self, service: Service) -> &ApiClient {
        match service {
            Service::Auth => &self.auth,
            Service::Orders => &self.orders,
            Service::Catalog => &self.catalog,
            Service::Admin => &self.admin,
        }
    }

    /// Authentication service client
    pub const fn auth(&self) -> &ApiClient {
        &self.auth
    }

    /// Order tracking client
    pub const fn orders(&self) -> &ApiClient {
        &self.orders
    }

    /// Catalog client
    pub const fn catalog(&self) -> &ApiClient {
        &self.catalog
    }

    /// Root admin API client
    pub const fn admin(&self) -> &ApiClient {
        &self.admin
    }

    /// The shared coordinator
    pub const fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }
}
