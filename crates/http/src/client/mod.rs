//! Harvest HTTP client
//!
//! Every [`ApiClient`] attaches the current access token to its requests
//! and, when a backend answers 401, asks the shared [`SessionCoordinator`]
//! for a new token and replays the request once.

pub mod error;
pub mod request;
pub mod services;
pub mod session;
pub mod sink;
pub mod store;

pub use error::{ClientError, RefreshError, StoreError};
pub use request::{
    ApiResponse, FormPart, MultipartForm, PartValue, RequestBody, RequestDescriptor,
};
pub use services::{Service, ServiceSet};
pub use session::{SessionCoordinator, SessionCoordinatorBuilder};
pub use sink::{SessionSink, TracingSink};
pub use store::{
    ACCESS_TOKEN_KEY, ADMIN_EMAIL_KEY, FileStore, MemoryStore, REFRESH_COOKIE_KEY, SessionStore,
};

use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Per-request timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("harvest-client/", env!("CARGO_PKG_VERSION"));

/// Client for one backend base URL
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    coordinator: Arc<SessionCoordinator>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client on `base_url` sharing `coordinator`
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL
    pub fn new(
        base_url: impl Into<String>,
        coordinator: Arc<SessionCoordinator>,
    ) -> Result<Self, ClientError> {
        Self::builder()
            .base_url(base_url)
            .coordinator(coordinator)
            .build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Session coordinator shared by this client
    pub const fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Start a request descriptor
    pub fn request(&self, method: Method, path: &str) -> RequestDescriptor {
        RequestDescriptor::new(method, path)
    }

    /// Send a request, renewing the session and replaying once on 401
    ///
    /// Transport errors and every non-401 failure are returned unchanged.
    /// A 401 on the replay is returned as [`ClientError::AuthenticationFailed`].
    ///
    /// # Errors
    ///
    /// Returns the transport error, the mapped HTTP error status, or
    /// [`ClientError::Refresh`] when the session could not be renewed
    #[instrument(
        name = "api_send",
        skip(self, descriptor),
        fields(base_url = %self.base_url, method = %descriptor.method(), path = %descriptor.path())
    )]
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<ApiResponse, ClientError> {
        let mut descriptor = descriptor;
        let mut token = self.coordinator.access_token();

        loop {
            let response = self.dispatch(&descriptor, token.as_deref()).await?;

            if response.status() == StatusCode::UNAUTHORIZED && !descriptor.is_replay() {
                debug!("access token rejected, renewing session");
                token = Some(self.coordinator.renew().await?);
                descriptor = descriptor.replayed();
                continue;
            }

            return Self::finish(response).await;
        }
    }

    /// Send a request and decode the JSON response
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`]; also fails if the body does not decode as `T`
    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ClientError> {
        self.send(descriptor).await?.json()
    }

    /// GET `path`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(RequestDescriptor::get(path)).await
    }

    /// POST a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(RequestDescriptor::post(path).json(body)?).await
    }

    /// PUT a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(RequestDescriptor::put(path).json(body)?).await
    }

    /// PATCH `path` with a JSON body
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(RequestDescriptor::patch(path).json(body)?).await
    }

    /// DELETE `path`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(RequestDescriptor::delete(path)).await
    }

    /// POST a multipart form to `path`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> Result<T, ClientError> {
        self.execute(RequestDescriptor::post(path).multipart(form))
            .await
    }

    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let request = descriptor.build(&self.client, &self.base_url, token)?;
        let response = request.send().await?;
        debug!(
            status = response.status().as_u16(),
            retry = descriptor.retry(),
            authenticated = token.is_some(),
            "response received"
        );
        Ok(response)
    }

    async fn finish(response: reqwest::Response) -> Result<ApiResponse, ClientError> {
        let status = response.status();

        if status.is_success() {
            ApiResponse::read(response).await
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    coordinator: Option<Arc<SessionCoordinator>>,
    refresh_url: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Share an existing session coordinator
    #[must_use]
    pub fn coordinator(mut self, coordinator: Arc<SessionCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Create a private coordinator refreshing against `url`
    ///
    /// Ignored when a coordinator is supplied.
    #[must_use]
    pub fn refresh_url(mut self, url: impl Into<String>) -> Self {
        self.refresh_url = Some(url.into());
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or invalid, neither a
    /// coordinator nor a refresh URL was given, or the HTTP client cannot
    /// be built
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url: {e}")))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let coordinator = match (self.coordinator, self.refresh_url) {
            (Some(coordinator), _) => coordinator,
            (None, Some(refresh_url)) => Arc::new(
                SessionCoordinator::builder()
                    .refresh_url(refresh_url)
                    .build()?,
            ),
            (None, None) => {
                return Err(ClientError::Configuration(
                    "a session coordinator or refresh_url is required".into(),
                ));
            }
        };

        let client = ClientBuilder::new()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .cookie_provider(coordinator.cookie_jar())
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .build()?;

        Ok(ApiClient {
            client,
            base_url,
            coordinator,
        })
    }
}
