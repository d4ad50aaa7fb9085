//! In-process [`WriteableCache`].
//!
//! Keeps `CacheData` directly in nested maps instead of encoding it onto a
//! key-value store, with the key-value cache's visibility rules:
//!
//! - an item with neither attributes nor relationships writes nothing;
//! - an id merged only with relationships is listed by `get_identifiers`
//!   but reads as absent until it has attributes;
//! - non-empty attributes replace stored ones, each merged relationship
//!   replaces its stored set, and omitted relationships are kept.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::CacheData;
use crate::domain::ports::{Cache, WriteableCache};

/// Cache held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    types: RwLock<HashMap<String, HashMap<String, CacheData>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_visible(item: &CacheData) -> bool {
        !item.attributes.is_empty()
    }

    fn merge_into(existing: &mut CacheData, item: &CacheData) {
        if !item.attributes.is_empty() {
            existing.attributes = item.attributes.clone();
        }
        for (name, ids) in &item.relationships {
            existing.relationships.insert(name.clone(), ids.clone());
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>> {
        let types = self.types.read().await;
        let Some(items) = types.get(type_name) else {
            return Ok(Vec::new());
        };

        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| items.get(id))
            .filter(|item| Self::is_visible(item))
            .cloned()
            .collect())
    }

    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>> {
        let types = self.types.read().await;
        Ok(types
            .get(type_name)
            .map(|items| items.values().filter(|item| Self::is_visible(item)).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>> {
        let types = self.types.read().await;
        Ok(types
            .get(type_name)
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl WriteableCache for InMemoryCache {
    async fn merge_all(&self, type_name: &str, items: &[CacheData]) -> DomainResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut types = self.types.write().await;
        let stored = types.entry(type_name.to_string()).or_default();
        for item in items {
            if item.attributes.is_empty() && item.relationships.is_empty() {
                continue;
            }
            match stored.get_mut(&item.id) {
                Some(existing) => Self::merge_into(existing, item),
                None => {
                    stored.insert(item.id.clone(), item.clone());
                }
            }
        }
        Ok(())
    }

    async fn evict_all(&self, type_name: &str, ids: &[String]) -> DomainResult<()> {
        let mut types = self.types.write().await;
        if let Some(stored) = types.get_mut(type_name) {
            for id in ids {
                stored.remove(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_merge_keeps_omitted_relationships_and_attributes() {
        let cache = InMemoryCache::new();
        let first = CacheData::new("i-1")
            .with_attribute("state", "running")
            .with_relationship("loadBalancers", ["lb-1"])
            .with_relationship("securityGroups", ["sg-1"]);
        cache.merge("instances", &first).await.unwrap();

        let second = CacheData::new("i-1").with_relationship("loadBalancers", ["lb-2"]);
        cache.merge("instances", &second).await.unwrap();

        let stored = cache.get("instances", "i-1").await.unwrap().unwrap();
        assert_eq!(stored.attributes.get("state"), Some(&json!("running")));
        assert_eq!(stored.related("loadBalancers").unwrap().len(), 1);
        assert!(stored.related("loadBalancers").unwrap().contains("lb-2"));
        assert!(stored.related("securityGroups").unwrap().contains("sg-1"));
    }

    #[tokio::test]
    async fn test_relationship_only_item_is_listed_but_not_readable() {
        let cache = InMemoryCache::new();
        cache
            .merge_all(
                "instances",
                &[
                    CacheData::new("i-1").with_relationship("loadBalancers", ["lb-1"]),
                    CacheData::new("i-2"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(cache.get_identifiers("instances").await.unwrap(), vec!["i-1".to_string()]);
        assert!(cache.get("instances", "i-1").await.unwrap().is_none());
        assert!(cache.get_all("instances").await.unwrap().is_empty());

        cache
            .merge("instances", &CacheData::new("i-1").with_attribute("state", "running"))
            .await
            .unwrap();
        let stored = cache.get("instances", "i-1").await.unwrap().unwrap();
        assert!(stored.related("loadBalancers").unwrap().contains("lb-1"));
    }

    #[tokio::test]
    async fn test_evict_removes_identifier() {
        let cache = InMemoryCache::new();
        cache
            .merge_all(
                "instances",
                &[CacheData::new("i-1").with_attribute("a", 1), CacheData::new("i-2").with_attribute("a", 2)],
            )
            .await
            .unwrap();

        cache.evict("instances", "i-1").await.unwrap();

        assert_eq!(cache.get_identifiers("instances").await.unwrap(), vec!["i-2".to_string()]);
        assert!(cache.get("instances", "i-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_type_is_empty_not_error() {
        let cache = InMemoryCache::new();
        assert!(cache.get_all("nothing").await.unwrap().is_empty());
        assert!(cache.get("nothing", "x").await.unwrap().is_none());
    }
}
