//! Platform hooks invoked when a session ends
//!
//! The coordinator wipes the session store itself; the sink is where a host
//! drops whatever else it caches about the session and sends the user back
//! to a login entry point (a navigation event in a UI, a redirect response
//! in a server, an exit message in a CLI).

use tracing::{debug, warn};

/// Receives session teardown notifications
pub trait SessionSink: Send + Sync {
    /// Drop host-side session state
    fn clear(&self);

    /// Send the user to the login entry point
    fn redirect_to_login(&self);
}

/// Sink that only records the teardown in the log
#[derive(Debug, Clone)]
pub struct TracingSink {
    login_url: String,
}

impl TracingSink {
    /// Create a sink pointing at `login_url`
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
        }
    }

    /// The login entry point
    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new("/login")
    }
}

impl SessionSink for TracingSink {
    fn clear(&self) {
        debug!("session state cleared");
    }

    fn redirect_to_login(&self) {
        warn!(login_url = %self.login_url, "session ended, login required");
    }
}
