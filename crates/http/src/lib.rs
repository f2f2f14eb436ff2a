//! Harvest HTTP client
//!
//! Authenticated access to the admin dashboard's backends (auth, orders,
//! catalog, root admin API). Every request carries the stored bearer token;
//! an expired token is refreshed once per burst of 401s and the affected
//! requests are replayed.

pub mod client;
pub mod types;

pub use client::{
    ApiClient, ApiResponse, ClientError, MultipartForm, RequestDescriptor, Service, ServiceSet,
    SessionCoordinator,
};
