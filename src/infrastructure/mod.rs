//! Infrastructure layer module
//!
//! Ambient concerns shared by every deployment of the cache:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
