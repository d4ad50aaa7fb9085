//! SQLite adapter for [`LockService`].
//!
//! Every node of the fleet points at the same database. A lock row stores
//! its owner and an absolute expiry; acquisition is a single upsert that
//! only takes effect when the row is missing, expired, or already ours.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::StoreError;
use crate::domain::ports::LockService;

/// [`LockService`] backed by the `agent_locks` table.
#[derive(Clone)]
pub struct SqliteLockService {
    pool: SqlitePool,
}

impl SqliteLockService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn expiry_ms(now: i64, ttl: Duration) -> i64 {
        now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl LockService for SqliteLockService {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Self::now_ms();
        let result = sqlx::query(
            "INSERT INTO agent_locks (name, owner, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, expires_at_ms = excluded.expires_at_ms
             WHERE agent_locks.expires_at_ms <= ?4 OR agent_locks.owner = excluded.owner",
        )
        .bind(key)
        .bind(owner)
        .bind(Self::expiry_ms(now, ttl))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn heartbeat(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Self::now_ms();
        let result = sqlx::query(
            "UPDATE agent_locks SET expires_at_ms = ?1
             WHERE name = ?2 AND owner = ?3 AND expires_at_ms > ?4",
        )
        .bind(Self::expiry_ms(now, ttl))
        .bind(key)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM agent_locks WHERE name = ? AND owner = ?")
            .bind(key)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
