//! In-memory adapters: a direct cache, a key-value store and a lock service.

pub mod cache;
pub mod key_value_store;
pub mod lock_service;

pub use cache::InMemoryCache;
pub use key_value_store::InMemoryKeyValueStore;
pub use lock_service::InMemoryLockService;
