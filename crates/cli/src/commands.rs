//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use harvest_core::ClientConfig;
use harvest_http::client::{
    ClientError, FileStore, MultipartForm, RequestDescriptor, Service, ServiceSet,
};
use reqwest::Method;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config;
use crate::sink::CliSink;

#[derive(Subcommand)]
pub enum Commands {
    /// Store a session obtained from the login endpoint
    Login {
        /// Access token
        #[arg(long, env = "HARVEST_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        /// Email of the admin the token belongs to
        #[arg(long)]
        email: Option<String>,

        /// Refresh credential cookie (`refreshToken=...`)
        #[arg(long, env = "HARVEST_REFRESH_COOKIE", hide_env_values = true)]
        refresh_cookie: Option<String>,
    },

    /// Remove the stored session
    Logout,

    /// Show the stored session
    Status,

    /// Send an authenticated request to one of the backends
    Request {
        /// Backend: auth, orders, catalog or admin
        #[arg(value_parser = parse_service)]
        service: Service,

        /// HTTP method
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path relative to the service base URL
        path: String,

        /// JSON request body
        #[arg(long, conflicts_with_all = ["fields", "files"])]
        json: Option<String>,

        /// Multipart text field (`name=value`), repeatable
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Multipart file field (`name=path`), repeatable
        #[arg(long = "file", value_parser = parse_file_field)]
        files: Vec<(String, PathBuf)>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output file path (`.toml`)
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    pub async fn execute(self, config_path: Option<PathBuf>, sink: Arc<CliSink>) -> Result<()> {
        match self {
            Self::InitConfig { path, force } => {
                config::generate_default_config(&path, force)?;
                println!("Generated configuration at: {}", path.display());
                Ok(())
            }
            Self::Login {
                token,
                email,
                refresh_cookie,
            } => {
                let (_, services) = open_services(config_path.as_deref(), sink)?;
                let session = services.coordinator();
                session.begin_session(&token, email.as_deref())?;
                if let Some(cookie) = refresh_cookie {
                    session.set_refresh_cookie(&cookie)?;
                }
                println!("Logged in{}", email.map(|e| format!(" as {e}")).unwrap_or_default());
                Ok(())
            }
            Self::Logout => {
                let (_, services) = open_services(config_path.as_deref(), sink)?;
                services.coordinator().end_session()?;
                println!("Logged out");
                Ok(())
            }
            Self::Status => {
                let (config, services) = open_services(config_path.as_deref(), sink)?;
                let session = services.coordinator();
                match (session.access_token(), session.admin_email()) {
                    (Some(_), Some(email)) => println!("Logged in as {email}"),
                    (Some(_), None) => println!("Logged in"),
                    (None, _) => println!("Not logged in"),
                }
                println!("Session file: {}", config.store_path.display());
                Ok(())
            }
            Self::Request {
                service,
                method,
                path,
                json,
                fields,
                files,
            } => {
                let (_, services) = open_services(config_path.as_deref(), sink)?;
                let descriptor = build_descriptor(method, &path, json.as_deref(), fields, &files)?;
                let response = services.client(service).send(descriptor).await?;
                info!(%service, status = response.status().as_u16(), "request completed");

                match response.json::<Value>() {
                    Ok(Value::Null) => {}
                    Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    Err(_) => println!("{}", response.text()),
                }
                Ok(())
            }
        }
    }
}

/// Load configuration and build the clients on the on-disk session
fn open_services(
    config_path: Option<&Path>,
    sink: Arc<CliSink>,
) -> Result<(ClientConfig, ServiceSet)> {
    let config = config::load_config(config_path)?;
    sink.set_login_url(&config.login_url);
    let store = FileStore::open(&config.store_path).with_context(|| {
        format!("failed to open session store {}", config.store_path.display())
    })?;
    let services = ServiceSet::from_config(&config, Arc::new(store), sink)?;
    Ok((config, services))
}

fn build_descriptor(
    method: Method,
    path: &str,
    json: Option<&str>,
    fields: Vec<(String, String)>,
    files: &[(String, PathBuf)],
) -> Result<RequestDescriptor> {
    let descriptor = RequestDescriptor::new(method, path);

    if fields.is_empty() && files.is_empty() {
        return match json {
            Some(raw) => {
                let body: Value = serde_json::from_str(raw).context("--json is not valid JSON")?;
                Ok(descriptor.json(&body)?)
            }
            None => Ok(descriptor),
        };
    }
    if json.is_some() {
        bail!("--json cannot be combined with --field or --file");
    }

    let mut form = MultipartForm::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for (name, file) in files {
        let bytes =
            std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
        form = form.file(name.as_str(), file_name(name, file), bytes);
    }

    Ok(descriptor.multipart(form))
}

fn file_name(field: &str, path: &Path) -> String {
    path.file_name()
        .map_or_else(|| field.to_string(), |n| n.to_string_lossy().into_owned())
}

fn parse_service(s: &str) -> Result<Service, String> {
    s.parse().map_err(|e: ClientError| e.to_string())
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method '{s}'"))
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

fn parse_file_field(s: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = parse_field(s)?;
    if path.is_empty() {
        return Err(format!("missing file path in '{s}'"));
    }
    Ok((name, PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_http::client::{PartValue, RequestBody};

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("title=Heirloom tomato").unwrap(),
            ("title".to_string(), "Heirloom tomato".to_string())
        );
        assert_eq!(
            parse_field("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=value").is_err());
        assert!(parse_file_field("image=").is_err());
    }

    #[test]
    fn test_parse_method_and_service() {
        assert_eq!(parse_method("patch").unwrap(), Method::PATCH);
        assert!(parse_method("NOT A METHOD").is_err());
        assert_eq!(parse_service("categories").unwrap(), Service::Catalog);
        assert!(parse_service("billing").is_err());
    }

    #[test]
    fn test_json_descriptor() {
        let descriptor =
            build_descriptor(Method::POST, "/api/coupons", Some(r#"{"code":"SPRING10"}"#), vec![], &[])
                .unwrap();
        match descriptor.request_body() {
            RequestBody::Json(body) => assert_eq!(body["code"], "SPRING10"),
            other => panic!("unexpected body: {other:?}"),
        }

        assert!(build_descriptor(Method::POST, "/api/coupons", Some("{"), vec![], &[]).is_err());
    }

    #[test]
    fn test_multipart_descriptor_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("tomato.png");
        std::fs::write(&image, b"png-bytes").unwrap();

        let descriptor = build_descriptor(
            Method::POST,
            "/api/products",
            None,
            vec![("title".to_string(), "Tomato".to_string())],
            &[("image".to_string(), image)],
        )
        .unwrap();

        let RequestBody::Multipart(form) = descriptor.request_body() else {
            panic!("expected a multipart body");
        };
        assert_eq!(form.field_names().collect::<Vec<_>>(), ["title", "image"]);
        match &form.parts()[1].value {
            PartValue::File {
                file_name, bytes, ..
            } => {
                assert_eq!(file_name, "tomato.png");
                assert_eq!(&bytes[..], b"png-bytes");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = build_descriptor(
            Method::POST,
            "/api/products",
            None,
            vec![],
            &[("image".to_string(), PathBuf::from("/nonexistent/tomato.png"))],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_configured_login_url_reaches_sink() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("harvest.toml");
        ClientConfig {
            login_url: "https://admin.harvest.example/login".to_string(),
            store_path: dir.path().join("session.json"),
            ..ClientConfig::default()
        }
        .save(&config_path)
        .unwrap();

        let sink = Arc::new(CliSink::new());
        let (config, _) = open_services(Some(&config_path), Arc::clone(&sink)).unwrap();

        assert_eq!(config.login_url, "https://admin.harvest.example/login");
        assert_eq!(sink.login_url(), Some("https://admin.harvest.example/login"));
        assert!(
            sink.expiry_message()
                .contains("https://admin.harvest.example/login")
        );
    }
}
