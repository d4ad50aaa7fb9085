//! Pools for the shared SQLite database behind the store and lock backends.
//!
//! Every node of a fleet opens the same database file, so the file is
//! always opened in WAL mode and writers wait out each other's locks for
//! `busy_timeout` instead of failing immediately.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::domain::models::StoreConfig;

/// Failure to open a database pool.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No database path configured.
    #[error("Database path is empty")]
    EmptyPath,
    /// The database's parent directory could not be created.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// SQLite refused the connection.
    #[error("Failed to open database: {0}")]
    Open(#[source] sqlx::Error),
}

/// Pool sizing and lock waiting for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a writer waits on a locked database.
    pub busy_timeout: Duration,
}

impl From<&StoreConfig> for PoolConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}

/// Open (creating if needed) the database file at `path`.
pub async fn open_file_pool(path: &Path, config: &PoolConfig) -> Result<SqlitePool, ConnectionError> {
    if path.as_os_str().is_empty() {
        return Err(ConnectionError::EmptyPath);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConnectionError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

/// Private in-memory database, for tests. One connection, since each
/// connection to `:memory:` sees a database of its own.
pub async fn open_memory_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(ConnectionError::Open)?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::StoreBackend;

    #[test]
    fn test_pool_config_follows_store_config() {
        let store = StoreConfig {
            backend: StoreBackend::Sqlite,
            database_path: "cache.db".to_string(),
            max_connections: 0,
            busy_timeout_ms: 750,
        };

        let config = PoolConfig::from(&store);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_file_pool_creates_parent_directory_in_wal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let config = PoolConfig::from(&StoreConfig::default());

        let pool = open_file_pool(&path, &config).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();

        assert_eq!(mode.to_lowercase(), "wal");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_empty_path_is_rejected() {
        let config = PoolConfig::from(&StoreConfig::default());
        assert!(matches!(
            open_file_pool(Path::new(""), &config).await,
            Err(ConnectionError::EmptyPath)
        ));
    }
}
