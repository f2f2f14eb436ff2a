//! Client error types

use std::time::Duration;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network, timeout or request construction error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The access token could not be refreshed; the session has ended
    #[error("Session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// The session store could not be read or written
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// HTTP status carried by this error, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::ServerError { status, .. } => Some(*status),
            Self::AuthenticationFailed(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::BadRequest(_) => Some(400),
            Self::Forbidden(_) => Some(403),
            Self::Refresh(e) => e.status(),
            Self::Serialization(_) | Self::Configuration(_) | Self::Store(_) => None,
        }
    }

    /// Whether the caller must log in again
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::Refresh(_) | Self::AuthenticationFailed(_))
    }

    /// Whether the request never produced an HTTP response
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(e) if e.status().is_none())
    }
}

/// Outcome of a failed refresh, shared with every queued request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-success status
    #[error("refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The refresh call never produced a response
    #[error("refresh transport error: {0}")]
    Transport(String),

    /// The refresh call did not settle in time
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),

    /// The refresh endpoint answered 2xx without a usable token
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The new token could not be persisted
    #[error("failed to persist refreshed token: {0}")]
    Storage(String),

    /// The request driving the refresh was dropped before it settled
    #[error("refresh abandoned before completion")]
    Abandoned,
}

impl RefreshError {
    /// Status returned by the refresh endpoint, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Session store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file holds invalid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
