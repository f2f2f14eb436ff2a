//! Session coordination
//!
//! [`SessionCoordinator`] owns everything the clients of one process share
//! about the session: the token store, the cookie jar carrying the refresh
//! credential, and the refresh state. At most one refresh is in flight at a
//! time; every caller that needs a new token while one is running is queued
//! and released together with the outcome of that single refresh.
//!
//! ```text
//! IDLE --renew()--> REFRESHING --ok--> IDLE   (store token, wake waiters with it)
//!                        |
//!                        +----err--> IDLE     (clear session, redirect, wake waiters with err)
//! renew() while REFRESHING: enqueue, state unchanged
//! ```

use super::error::{ClientError, RefreshError};
use super::sink::{SessionSink, TracingSink};
use super::store::{
    ACCESS_TOKEN_KEY, ADMIN_EMAIL_KEY, MemoryStore, REFRESH_COOKIE_KEY, SessionStore,
};
use crate::types::RefreshResponse;
use reqwest::cookie::{CookieStore, Jar};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default bound on a single refresh call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    started: u64,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Shared session state and refresh coordination
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    sink: Arc<dyn SessionSink>,
    refresh_url: Url,
    refresh_timeout: Duration,
    cookie_jar: Arc<Jar>,
    http: reqwest::Client,
    state: Mutex<RefreshState>,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("refresh_url", &self.refresh_url.as_str())
            .field("refresh_timeout", &self.refresh_timeout)
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

impl SessionCoordinator {
    /// Create a coordinator with an in-memory store and a logging sink
    ///
    /// # Errors
    ///
    /// Returns an error if `refresh_url` is not an absolute URL
    pub fn new(refresh_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().refresh_url(refresh_url).build()
    }

    /// Create a new coordinator builder
    pub fn builder() -> SessionCoordinatorBuilder {
        SessionCoordinatorBuilder::default()
    }

    /// Refresh endpoint
    pub const fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    /// Cookie jar shared by every client built on this coordinator
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookie_jar)
    }

    /// Current access token
    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    /// Email of the logged-in admin
    pub fn admin_email(&self) -> Option<String> {
        self.store.get(ADMIN_EMAIL_KEY)
    }

    /// Whether a refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Number of callers queued behind the in-flight refresh
    pub fn pending_waiters(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Number of refresh calls started so far
    pub fn refresh_count(&self) -> u64 {
        self.lock_state().started
    }

    /// Record a freshly logged-in session
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written
    pub fn begin_session(
        &self,
        access_token: &str,
        admin_email: Option<&str>,
    ) -> Result<(), ClientError> {
        self.store.set(ACCESS_TOKEN_KEY, access_token)?;
        match admin_email {
            Some(email) => self.store.set(ADMIN_EMAIL_KEY, email)?,
            None => self.store.remove(ADMIN_EMAIL_KEY)?,
        }
        info!(admin = admin_email.unwrap_or("-"), "session started");
        Ok(())
    }

    /// Remember the refresh credential and present it on the next refresh
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written
    pub fn set_refresh_cookie(&self, cookie: &str) -> Result<(), ClientError> {
        seed_jar(&self.cookie_jar, cookie, &self.refresh_url);
        self.store.set(REFRESH_COOKIE_KEY, cookie)?;
        Ok(())
    }

    /// Log out: wipe the store and host-side session state
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared
    pub fn end_session(&self) -> Result<(), ClientError> {
        self.store.clear()?;
        self.sink.clear();
        info!("session ended");
        Ok(())
    }

    /// Obtain a new access token, joining the in-flight refresh if there is one
    ///
    /// On failure the session has already been torn down when this returns.
    #[instrument(name = "session_renew", skip(self))]
    pub async fn renew(&self) -> Result<String, RefreshError> {
        // check-and-set happens under one lock with no await in between
        let role = {
            let mut state = self.lock_state();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                debug!(queued = state.waiters.len(), "refresh in flight, queueing");
                Role::Waiter(rx)
            } else {
                state.in_flight = true;
                state.started += 1;
                Role::Leader
            }
        };

        match role {
            Role::Waiter(rx) => rx.await.unwrap_or(Err(RefreshError::Abandoned)),
            Role::Leader => {
                let lease = RefreshLease {
                    coordinator: self,
                    settled: false,
                };
                let outcome = self.lead_refresh().await;
                lease.settle(&outcome);
                outcome
            }
        }
    }

    async fn lead_refresh(&self) -> RefreshOutcome {
        info!(url = %self.refresh_url, "refreshing access token");

        let outcome =
            match tokio::time::timeout(self.refresh_timeout, self.call_refresh_endpoint()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RefreshError::TimedOut(self.refresh_timeout)),
            }
            .and_then(|token| self.persist_token(&token).map(|()| token));

        match &outcome {
            Ok(_) => info!("access token refreshed"),
            Err(e) => {
                warn!(error = %e, "access token refresh failed, ending session");
                self.terminate();
            }
        }

        outcome
    }

    async fn call_refresh_endpoint(&self) -> RefreshOutcome {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(RefreshError::MalformedResponse(
                "empty access token".to_string(),
            ));
        }

        Ok(body.access_token)
    }

    fn persist_token(&self, token: &str) -> Result<(), RefreshError> {
        self.store
            .set(ACCESS_TOKEN_KEY, token)
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        // the refresh endpoint may rotate its cookie
        if let Some(cookies) = self.cookie_jar.cookies(&self.refresh_url) {
            if let Ok(cookies) = cookies.to_str() {
                self.store
                    .set(REFRESH_COOKIE_KEY, cookies)
                    .map_err(|e| RefreshError::Storage(e.to_string()))?;
            }
        }

        Ok(())
    }

    fn terminate(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear session store");
        }
        self.sink.clear();
        self.sink.redirect_to_login();
    }

    /// Leave the refreshing state and hand `outcome` to every queued caller
    fn release(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.lock_state();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "releasing queued requests"
        );
        for waiter in waiters {
            // a dropped receiver means that caller went away
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the leader for the duration of a refresh; releasing the queue is
/// guaranteed even if the leader's future is dropped mid-flight.
struct RefreshLease<'a> {
    coordinator: &'a SessionCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.coordinator.release(outcome);
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh abandoned before it settled");
            self.coordinator.release(&Err(RefreshError::Abandoned));
        }
    }
}

fn seed_jar(jar: &Jar, cookie: &str, url: &Url) {
    for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        jar.add_cookie_str(pair, url);
    }
}

/// Builder for [`SessionCoordinator`]
pub struct SessionCoordinatorBuilder {
    refresh_url: Option<String>,
    refresh_timeout: Duration,
    store: Option<Arc<dyn SessionStore>>,
    sink: Option<Arc<dyn SessionSink>>,
    user_agent: Option<String>,
    refresh_cookie: Option<String>,
}

impl Default for SessionCoordinatorBuilder {
    fn default() -> Self {
        Self {
            refresh_url: None,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            store: None,
            sink: None,
            user_agent: None,
            refresh_cookie: None,
        }
    }
}

impl SessionCoordinatorBuilder {
    /// Set the refresh endpoint (absolute URL)
    #[must_use]
    pub fn refresh_url(mut self, url: impl Into<String>) -> Self {
        self.refresh_url = Some(url.into());
        self
    }

    /// Bound the refresh call
    #[must_use]
    pub const fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Set the session store
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the session sink
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the user agent of refresh calls
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Seed the cookie jar with the refresh credential (`name=value[; ...]`)
    #[must_use]
    pub fn refresh_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.refresh_cookie = Some(cookie.into());
        self
    }

    /// Build the coordinator
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh URL is missing or invalid, or the
    /// refresh client cannot be built
    pub fn build(self) -> Result<SessionCoordinator, ClientError> {
        let refresh_url = self
            .refresh_url
            .ok_or_else(|| ClientError::Configuration("refresh_url is required".into()))?;
        let refresh_url = Url::parse(&refresh_url)
            .map_err(|e| ClientError::Configuration(format!("invalid refresh_url: {e}")))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SessionStore>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink::default()) as Arc<dyn SessionSink>);

        let cookie_jar = Arc::new(Jar::default());
        if let Some(cookie) = self
            .refresh_cookie
            .or_else(|| store.get(REFRESH_COOKIE_KEY))
        {
            seed_jar(&cookie_jar, &cookie, &refresh_url);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| super::DEFAULT_USER_AGENT.to_string());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .user_agent(user_agent)
            .build()?;

        Ok(SessionCoordinator {
            store,
            sink,
            refresh_url,
            refresh_timeout: self.refresh_timeout,
            cookie_jar,
            http,
            state: Mutex::new(RefreshState::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sink::mock::MockSessionSink;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REFRESH_PATH: &str = "/api/auth/refresh";

    fn coordinator_for(
        server: &MockServer,
        store: Arc<MemoryStore>,
        sink: Arc<dyn SessionSink>,
    ) -> SessionCoordinator {
        SessionCoordinator::builder()
            .refresh_url(format!("{}{REFRESH_PATH}", server.uri()))
            .store(store)
            .sink(sink)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_renew_issues_single_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "accessToken": "xyz" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(&server, store.clone(), Arc::new(TracingSink::default()));

        let (a, b, c) = tokio::join!(coordinator.renew(), coordinator.renew(), coordinator.renew());

        assert_eq!(a.unwrap(), "xyz");
        assert_eq!(b.unwrap(), "xyz");
        assert_eq!(c.unwrap(), "xyz");
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending_waiters(), 0);
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_failed_refresh_tears_down_session_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string("refresh token expired")
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut sink = MockSessionSink::new();
        sink.expect_clear().times(1).return_const(());
        sink.expect_redirect_to_login().times(1).return_const(());

        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "stale").unwrap();
        store.set(ADMIN_EMAIL_KEY, "admin@harvest.example").unwrap();
        let coordinator = coordinator_for(&server, store.clone(), Arc::new(sink));

        let (a, b) = tokio::join!(coordinator.renew(), coordinator.renew());

        let expected = RefreshError::Rejected {
            status: 403,
            message: "refresh token expired".to_string(),
        };
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
        assert!(store.is_empty());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_malformed_refresh_body_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "nope" })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(&server, store, Arc::new(TracingSink::default()));

        let err = coordinator.renew().await.unwrap_err();
        assert!(matches!(err, RefreshError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_hung_refresh_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "accessToken": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "stale").unwrap();
        let coordinator = SessionCoordinator::builder()
            .refresh_url(format!("{}{REFRESH_PATH}", server.uri()))
            .refresh_timeout(Duration::from_millis(100))
            .store(store.clone())
            .build()
            .unwrap();

        let err = coordinator.renew().await.unwrap_err();
        assert_eq!(err, RefreshError::TimedOut(Duration::from_millis(100)));
        assert!(store.get(ACCESS_TOKEN_KEY).is_none());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "accessToken": "never" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "kept").unwrap();
        let coordinator = Arc::new(coordinator_for(
            &server,
            store.clone(),
            Arc::new(TracingSink::default()),
        ));

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.renew().await })
        };
        while !coordinator.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.renew().await })
        };
        while coordinator.pending_waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        leader.abort();

        assert_eq!(waiter.await.unwrap(), Err(RefreshError::Abandoned));
        assert!(!coordinator.is_refreshing());
        // an abandoned refresh is not a failed one: the session survives
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_begin_and_end_session() {
        let mut sink = MockSessionSink::new();
        sink.expect_clear().times(1).return_const(());
        sink.expect_redirect_to_login().never();

        let store = Arc::new(MemoryStore::new());
        let coordinator = SessionCoordinator::builder()
            .refresh_url("http://localhost:5000/api/auth/refresh")
            .store(store.clone())
            .sink(Arc::new(sink))
            .build()
            .unwrap();

        coordinator
            .begin_session("tok", Some("admin@harvest.example"))
            .unwrap();
        assert_eq!(coordinator.access_token().as_deref(), Some("tok"));
        assert_eq!(
            coordinator.admin_email().as_deref(),
            Some("admin@harvest.example")
        );

        coordinator.end_session().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_builder_requires_refresh_url() {
        let result = SessionCoordinator::builder().build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));

        let result = SessionCoordinator::new("relative/path");
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }
}
