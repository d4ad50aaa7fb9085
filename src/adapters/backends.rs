//! Construction of the configured store backend.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::memory::{InMemoryKeyValueStore, InMemoryLockService};
use crate::adapters::sqlite::{initialize_database, DatabaseError, PoolConfig, SqliteKeyValueStore, SqliteLockService};
use crate::domain::models::{StoreBackend, StoreConfig};
use crate::domain::ports::{KeyValueStore, LockService};

/// The key-value store and lock service of one backend.
///
/// Both halves of a SQLite backend share the same pool, so every node
/// pointed at the same database file sees the same cache and locks.
#[derive(Clone)]
pub struct StoreBackends {
    /// Store behind the key-value cache.
    pub store: Arc<dyn KeyValueStore>,
    /// Lock service for clustered scheduling.
    pub locks: Arc<dyn LockService>,
}

impl StoreBackends {
    /// Process-local backends.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryKeyValueStore::new()),
            locks: Arc::new(InMemoryLockService::new()),
        }
    }

    /// Open the backend named by `config`, running migrations for SQLite.
    pub async fn connect(config: &StoreConfig) -> Result<Self, DatabaseError> {
        match config.backend {
            StoreBackend::Memory => Ok(Self::in_memory()),
            StoreBackend::Sqlite => {
                let pool =
                    initialize_database(Path::new(&config.database_path), &PoolConfig::from(config)).await?;
                tracing::info!(path = %config.database_path, "SQLite store backend ready");
                Ok(Self {
                    store: Arc::new(SqliteKeyValueStore::new(pool.clone())),
                    locks: Arc::new(SqliteLockService::new(pool)),
                })
            }
        }
    }
}
