//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - YAML files under `.fleetcache/`
//! - `FLEETCACHE_*` environment variable overrides
//! - Validation into typed `ConfigError`s

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
