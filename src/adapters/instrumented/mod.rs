//! Observability decorators over store ports.

pub mod instrumented_key_value_store;

pub use instrumented_key_value_store::{InstrumentedKeyValueStore, StoreCallCounts};
