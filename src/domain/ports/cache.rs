//! Read and write contracts of an entity cache.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CacheData, IdentifierGlob};

/// Read-only access to cached entities, scoped by type namespace.
///
/// Absence is never an error: lookups of unknown ids yield `None` or an
/// empty collection.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get the entities of `type_name` with the given ids, in input order.
    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>>;

    /// Get every entity of `type_name`.
    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>>;

    /// Get the ids of every entity of `type_name`.
    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>>;

    /// Get a single entity.
    async fn get(&self, type_name: &str, id: &str) -> DomainResult<Option<CacheData>> {
        let mut found = self.get_all_by_ids(type_name, &[id.to_string()]).await?;
        Ok(found.pop())
    }

    /// Get the ids of `type_name` matching a glob (`*`, `?`).
    async fn filter_identifiers(&self, type_name: &str, glob: &str) -> DomainResult<Vec<String>> {
        let glob = IdentifierGlob::new(glob)?;
        Ok(glob.filter(self.get_identifiers(type_name).await?))
    }
}

/// A cache that can also be written by caching agents.
///
/// Merge is an upsert per id: a supplied relationship replaces that
/// relationship's set, an omitted relationship is left untouched, and empty
/// attributes leave stored attributes untouched.
#[async_trait]
pub trait WriteableCache: Cache {
    async fn merge_all(&self, type_name: &str, items: &[CacheData]) -> DomainResult<()>;

    async fn evict_all(&self, type_name: &str, ids: &[String]) -> DomainResult<()>;

    async fn merge(&self, type_name: &str, item: &CacheData) -> DomainResult<()> {
        self.merge_all(type_name, std::slice::from_ref(item)).await
    }

    async fn evict(&self, type_name: &str, id: &str) -> DomainResult<()> {
        self.evict_all(type_name, &[id.to_string()]).await
    }
}
