//! Adapters implementing the domain ports.

pub mod backends;
pub mod instrumented;
pub mod memory;
pub mod sqlite;

pub use backends::StoreBackends;
