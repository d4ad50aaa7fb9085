//! Domain layer for the fleetcache caching engine
//!
//! This module contains the entity model, error taxonomy and port traits.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, InstrumentationError, StoreError};
