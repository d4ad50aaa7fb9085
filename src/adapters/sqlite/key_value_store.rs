//! SQLite adapter for [`KeyValueStore`].
//!
//! Strings live in `kv_strings`, set members in `kv_sets`. Multi-key
//! operations are chunked to stay under SQLite's bound-parameter limit and
//! run inside a single transaction; the pool scopes each connection, so it
//! is returned on success, error and cancellation alike.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::domain::errors::StoreError;
use crate::domain::ports::KeyValueStore;

/// Keys (or rows) per statement; two binds per row keeps us under 999.
const CHUNK_SIZE: usize = 400;

/// [`KeyValueStore`] in a SQLite database.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Store over a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn in_clause<'a>(builder: &mut QueryBuilder<'a, Sqlite>, values: &'a [String]) {
    builder.push(" IN (");
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.as_str());
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_strings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_strings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<String, String> = HashMap::with_capacity(keys.len());
        let mut conn = self.pool.acquire().await?;
        for chunk in keys.chunks(CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new("SELECT key, value FROM kv_strings WHERE key");
            in_clause(&mut builder, chunk);
            let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&mut *conn).await?;
            found.extend(rows);
        }

        Ok(keys.iter().map(|key| found.get(key).cloned()).collect())
    }

    async fn mset(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in entries.chunks(CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO kv_strings (key, value) ");
            builder.push_values(chunk, |mut row, (key, value)| {
                row.push_bind(key.as_str()).push_bind(value.as_str());
            });
            builder.push(" ON CONFLICT(key) DO UPDATE SET value = excluded.value");
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for chunk in keys.chunks(CHUNK_SIZE) {
            let mut count = QueryBuilder::<Sqlite>::new(
                "SELECT COUNT(*) FROM (SELECT key FROM kv_strings WHERE key",
            );
            in_clause(&mut count, chunk);
            count.push(" UNION SELECT key FROM kv_sets WHERE key");
            in_clause(&mut count, chunk);
            count.push(")");
            let (existing,): (i64,) = count.build_query_as().fetch_one(&mut *tx).await?;
            removed += u64::try_from(existing).unwrap_or(0);

            let mut strings = QueryBuilder::<Sqlite>::new("DELETE FROM kv_strings WHERE key");
            in_clause(&mut strings, chunk);
            strings.build().execute(&mut *tx).await?;

            let mut sets = QueryBuilder::<Sqlite>::new("DELETE FROM kv_sets WHERE key");
            in_clause(&mut sets, chunk);
            sets.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut added = 0;
        let mut tx = self.pool.begin().await?;
        for chunk in members.chunks(CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO kv_sets (key, member) ");
            builder.push_values(chunk, |mut row, member| {
                row.push_bind(key).push_bind(member.as_str());
            });
            added += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for chunk in members.chunks(CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM kv_sets WHERE key = ");
            builder.push_bind(key);
            builder.push(" AND member");
            in_clause(&mut builder, chunk);
            removed += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT member FROM kv_sets WHERE key = ? ORDER BY member")
            .bind(key)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(member,)| member).collect())
    }
}
