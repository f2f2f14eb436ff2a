//! Configuration for the Harvest admin client
//!
//! Values are layered: built-in defaults, then an optional TOML/YAML file,
//! then `HARVEST_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `HARVEST_SERVICES__ORDERS=https://orders.example.com`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Absolute URL of the access-token refresh endpoint
    pub refresh_url: String,

    /// Login entry point the session is sent to after a forced logout
    pub login_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Timeout for the refresh call in seconds
    pub refresh_timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Location of the persisted session store
    pub store_path: PathBuf,

    /// Base URLs of the backend services
    pub services: ServicesConfig,
}

/// Backend service base URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Authentication service
    pub auth: String,

    /// Order tracking service
    pub orders: String,

    /// Category and product catalog service
    pub catalog: String,

    /// Root admin API (branches, inventory, coupons, discounts, admin users)
    pub admin: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            refresh_url: "http://localhost:5000/api/auth/refresh".to_string(),
            login_url: "/login".to_string(),
            timeout_secs: 10,
            refresh_timeout_secs: 15,
            user_agent: concat!("harvest-client/", env!("CARGO_PKG_VERSION")).to_string(),
            store_path: default_store_path(),
            services: ServicesConfig::default(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            auth: "http://localhost:5000".to_string(),
            orders: "http://localhost:5001".to_string(),
            catalog: "http://localhost:5002".to_string(),
            admin: "http://localhost:5003".to_string(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harvest")
        .join("session.json")
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable has the wrong type, or the resulting configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("services.auth", defaults.services.auth)?
            .set_default("services.orders", defaults.services.orders)?
            .set_default("services.catalog", defaults.services.catalog)?
            .set_default("services.admin", defaults.services.admin)?
            .set_default("refresh_url", defaults.refresh_url)?
            .set_default("login_url", defaults.login_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("refresh_timeout_secs", defaults.refresh_timeout_secs)?
            .set_default("user_agent", defaults.user_agent)?
            .set_default(
                "store_path",
                defaults.store_path.to_string_lossy().to_string(),
            )?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("HARVEST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, with environment overrides
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::load`]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Load configuration with defaults and environment variables only
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::load`]
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Check that every URL parses and the timeouts are usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending key
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("services.auth", &self.services.auth),
            ("services.orders", &self.services.orders),
            ("services.catalog", &self.services.catalog),
            ("services.admin", &self.services.admin),
            ("refresh_url", &self.refresh_url),
        ] {
            Url::parse(value)
                .map_err(|e| Error::invalid_config(format!("{key} is not a valid URL: {e}")))?;
        }

        if self.timeout_secs == 0 {
            return Err(Error::invalid_config("timeout_secs must be greater than 0"));
        }
        if self.refresh_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "refresh_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Per-request timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Refresh call timeout
    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// Write the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(15));
        assert!(config.store_path.ends_with("session.json"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let mut config = ClientConfig::default();
        config.services.orders = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("services.orders"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = ClientConfig {
            timeout_secs: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
refresh_url = "https://auth.example.com/api/auth/refresh"
timeout_secs = 3

[services]
orders = "https://orders.example.com"
"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.refresh_url, "https://auth.example.com/api/auth/refresh");
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.services.orders, "https://orders.example.com");
        // untouched keys keep their defaults
        assert_eq!(config.services.auth, ServicesConfig::default().auth);
        assert_eq!(config.refresh_timeout_secs, 15);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harvest.toml");

        let config = ClientConfig {
            login_url: "https://admin.example.com/login".to_string(),
            ..ClientConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded.login_url, "https://admin.example.com/login");
    }
}
