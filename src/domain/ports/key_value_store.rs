//! Backing key-value store port.
//!
//! The only wire protocol the cache depends on: string values, sets, and
//! batched multi-key reads, writes and deletes. Any store offering these
//! primitives can back a [`KeyValueCache`](crate::services::KeyValueCache).

use async_trait::async_trait;

use crate::domain::errors::StoreError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read many keys; the result has exactly one slot per requested key.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    async fn mset(&self, entries: &[(String, String)]) -> Result<(), StoreError>;

    /// Delete keys (string or set). Returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Add members to a set. Returns how many were newly added.
    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError>;

    /// Remove members from a set. Returns how many were removed.
    async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
