//! Session teardown hook for the command line

use harvest_http::client::SessionSink;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Records a forced logout so the process can exit asking for a new login
#[derive(Debug, Default)]
pub struct CliSink {
    expired: AtomicBool,
    login_url: OnceLock<String>,
}

impl CliSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the configured login entry point; the first value wins
    pub fn set_login_url(&self, url: impl Into<String>) {
        let _ = self.login_url.set(url.into());
    }

    /// Configured login entry point, once configuration has been loaded
    pub fn login_url(&self) -> Option<&str> {
        self.login_url.get().map(String::as_str)
    }

    /// Whether the session was torn down after a failed refresh
    pub fn session_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Message shown when the process exits after a forced logout
    pub fn expiry_message(&self) -> String {
        match self.login_url() {
            Some(url) => format!(
                "Session expired. Run `harvest login` or sign in again at {url}."
            ),
            None => "Session expired. Run `harvest login` to sign in again.".to_string(),
        }
    }
}

impl SessionSink for CliSink {
    fn clear(&self) {
        debug!("stored session removed");
    }

    fn redirect_to_login(&self) {
        warn!(
            login_url = self.login_url().unwrap_or("-"),
            "session could not be renewed, login required"
        );
        self.expired.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_redirect_marks_expiry() {
        let sink = CliSink::new();
        sink.clear();
        assert!(!sink.session_expired());

        sink.redirect_to_login();
        assert!(sink.session_expired());
    }

    #[test]
    fn test_expiry_message_names_login_url() {
        let sink = CliSink::new();
        assert!(sink.expiry_message().contains("harvest login"));

        sink.set_login_url("https://admin.harvest.example/login");
        sink.set_login_url("/ignored");
        assert_eq!(sink.login_url(), Some("https://admin.harvest.example/login"));
        assert!(
            sink.expiry_message()
                .contains("https://admin.harvest.example/login")
        );
    }
}
