//! Distributed lock port used by the clustered scheduler.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::StoreError;

/// A time-boxed mutual-exclusion primitive shared by every node of a fleet.
///
/// Locks expire on their own once `ttl` elapses without a heartbeat, which
/// is how a crashed owner's lock is recovered.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take `key` for `owner`. `Ok(false)` means another owner holds
    /// an unexpired lock. Re-acquiring a lock already held by `owner`
    /// succeeds and resets its TTL.
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Extend a lock held by `owner`. `Ok(false)` means ownership is gone.
    async fn heartbeat(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Release a lock held by `owner`; releasing someone else's lock is a no-op.
    async fn release(&self, key: &str, owner: &str) -> Result<(), StoreError>;
}
