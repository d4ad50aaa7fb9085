//! Read-only view over an ordered list of caches.
//!
//! Sources are consulted concurrently but merged in list order: for an
//! attribute present in several sources the later source wins, while
//! relationship sets are always unioned.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::domain::errors::DomainResult;
use crate::domain::models::CacheData;
use crate::domain::ports::Cache;

/// Merges reads from several [`Cache`] sources.
pub struct CompositeCache {
    caches: Vec<Arc<dyn Cache>>,
}

impl CompositeCache {
    /// Composite over `caches`, in precedence order.
    pub fn new(caches: Vec<Arc<dyn Cache>>) -> Self {
        Self { caches }
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// True when there are no sources.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Fold per-source results into one entry per id, in first-seen order.
    fn merge_sources(per_source: Vec<Vec<CacheData>>) -> Vec<CacheData> {
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, CacheData> = HashMap::new();

        for item in per_source.into_iter().flatten() {
            match merged.get_mut(&item.id) {
                Some(existing) => {
                    existing.attributes.extend(item.attributes);
                    for (name, related) in item.relationships {
                        existing.relationships.entry(name).or_default().extend(related);
                    }
                }
                None => {
                    order.push(item.id.clone());
                    merged.insert(item.id.clone(), item);
                }
            }
        }

        order.into_iter().filter_map(|id| merged.remove(&id)).collect()
    }

    fn union_identifiers(per_source: Vec<Vec<String>>) -> Vec<String> {
        let mut seen = HashSet::new();
        per_source
            .into_iter()
            .flatten()
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

#[async_trait]
impl Cache for CompositeCache {
    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let per_source =
            try_join_all(self.caches.iter().map(|cache| cache.get_all_by_ids(type_name, ids))).await?;
        Ok(Self::merge_sources(per_source))
    }

    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>> {
        let per_source = try_join_all(self.caches.iter().map(|cache| cache.get_all(type_name))).await?;
        Ok(Self::merge_sources(per_source))
    }

    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>> {
        let per_source =
            try_join_all(self.caches.iter().map(|cache| cache.get_identifiers(type_name))).await?;
        Ok(Self::union_identifiers(per_source))
    }

    async fn filter_identifiers(&self, type_name: &str, glob: &str) -> DomainResult<Vec<String>> {
        let per_source = try_join_all(
            self.caches
                .iter()
                .map(|cache| cache.filter_identifiers(type_name, glob)),
        )
        .await?;
        Ok(Self::union_identifiers(per_source))
    }
}
