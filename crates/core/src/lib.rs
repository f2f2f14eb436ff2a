//! Harvest core: configuration, errors and tracing setup shared by the
//! client library and the command-line tool.

pub mod config;
pub mod error;
#[cfg(feature = "tracing")]
pub mod tracing;

pub use config::{ClientConfig, ServicesConfig};
pub use error::{Error, Result};
