//! In-process [`LockService`].
//!
//! Coordinates schedulers that share one process (and tests). Expiry uses
//! `tokio::time::Instant`, so paused-clock tests can drive TTLs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::errors::StoreError;
use crate::domain::ports::LockService;

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// Locks held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unexpired owner of `key`.
    pub async fn owner_of(&self, key: &str) -> Option<String> {
        let locks = self.locks.lock().await;
        locks
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.owner.clone())
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();

        if let Some(entry) = locks.get(key) {
            if entry.expires_at > now && entry.owner != owner {
                return Ok(false);
            }
        }

        locks.insert(
            key.to_string(),
            LockEntry {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn heartbeat(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();

        match locks.get_mut(key) {
            Some(entry) if entry.owner == owner && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|entry| entry.owner == owner) {
            locks.remove(key);
        }
        Ok(())
    }
}
