//! SQLite adapters: a shared key-value store and a distributed lock table.

pub mod connection;
pub mod key_value_store;
pub mod lock_service;
pub mod migrations;

pub use connection::{open_file_pool, open_memory_pool, ConnectionError, PoolConfig};
pub use key_value_store::SqliteKeyValueStore;
pub use lock_service::SqliteLockService;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};

use std::path::Path;

use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open the database file at `path` and bring its schema up to date.
pub async fn initialize_database(path: &Path, config: &PoolConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = open_file_pool(path, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = open_memory_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
