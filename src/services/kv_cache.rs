//! Entity cache encoded onto a flat key-value store.
//!
//! Key layout for prefix `P`, type `T`, id `I` and relationship `R`:
//!
//! | key | value |
//! |---|---|
//! | `P:T:attributes:I` | JSON attribute map |
//! | `P:T:relationships:I:R` | JSON array of related ids |
//! | `P:T:relationships` | set of every relationship name merged for `T` |
//! | `P:T:members` | set of every id merged for `T` |
//!
//! The relationship-name set is a secondary index: relationship keys cannot
//! be enumerated by prefix, so reads and evictions consult it to know which
//! keys may exist. Multi-key writes are not transactional; a concurrent
//! reader may see new attributes next to stale relationships, but every
//! value it sees was written whole.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Attributes, CacheConfig, CacheData, Relationships};
use crate::domain::ports::{Cache, KeyValueStore, WriteableCache};

/// [`WriteableCache`] stored on a [`KeyValueStore`] under one key prefix.
pub struct KeyValueCache {
    prefix: String,
    store: Arc<dyn KeyValueStore>,
}

impl KeyValueCache {
    /// Cache writing its keys under `prefix`.
    pub fn new(prefix: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    /// Cache using the configured key prefix.
    pub fn from_config(config: &CacheConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(config.prefix.clone(), store)
    }

    /// Key prefix of this cache.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn attributes_key(&self, type_name: &str, id: &str) -> String {
        format!("{}:{}:attributes:{}", self.prefix, type_name, id)
    }

    fn relationship_key(&self, type_name: &str, id: &str, relationship: &str) -> String {
        format!("{}:{}:relationships:{}:{}", self.prefix, type_name, id, relationship)
    }

    fn all_relationships_key(&self, type_name: &str) -> String {
        format!("{}:{}:relationships", self.prefix, type_name)
    }

    fn members_key(&self, type_name: &str) -> String {
        format!("{}:{}:members", self.prefix, type_name)
    }

    /// Type names partition the key space, so they may not contain the
    /// separator.
    fn validate_type(type_name: &str) -> DomainResult<()> {
        if type_name.is_empty() || type_name.contains(':') {
            return Err(DomainError::InvalidType(type_name.to_string()));
        }
        Ok(())
    }

    async fn known_relationships(&self, type_name: &str) -> DomainResult<Vec<String>> {
        Ok(self.store.smembers(&self.all_relationships_key(type_name)).await?)
    }
}

fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[async_trait]
impl Cache for KeyValueCache {
    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>> {
        Self::validate_type(type_name)?;
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let known = self.known_relationships(type_name).await?;
        let stride = known.len() + 1;

        let mut keys = Vec::with_capacity(ids.len() * stride);
        for id in &ids {
            keys.push(self.attributes_key(type_name, id));
            for relationship in &known {
                keys.push(self.relationship_key(type_name, id, relationship));
            }
        }

        let values = self.store.mget(&keys).await?;
        if values.len() != keys.len() {
            return Err(DomainError::StoreUnavailable(format!(
                "mget returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        let mut results = Vec::with_capacity(ids.len());
        for (id, slots) in ids.into_iter().zip(values.chunks(stride)) {
            // Relationship slots without attributes are a partial write, not an entity.
            let Some(serialized_attributes) = &slots[0] else {
                continue;
            };

            let attributes: Attributes = serde_json::from_str(serialized_attributes)?;
            let mut relationships = Relationships::with_capacity(known.len());
            for (name, slot) in known.iter().zip(&slots[1..]) {
                if let Some(serialized) = slot {
                    let related: BTreeSet<String> = serde_json::from_str(serialized)?;
                    relationships.insert(name.clone(), related);
                }
            }

            results.push(CacheData {
                id,
                attributes,
                relationships,
            });
        }

        tracing::trace!(type_name, found = results.len(), "read cache data");
        Ok(results)
    }

    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>> {
        let ids = self.get_identifiers(type_name).await?;
        self.get_all_by_ids(type_name, &ids).await
    }

    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>> {
        Self::validate_type(type_name)?;
        Ok(self.store.smembers(&self.members_key(type_name)).await?)
    }
}

#[async_trait]
impl WriteableCache for KeyValueCache {
    async fn merge_all(&self, type_name: &str, items: &[CacheData]) -> DomainResult<()> {
        Self::validate_type(type_name)?;
        if items.is_empty() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(items.len());
        let mut relationship_names = BTreeSet::new();
        let mut entries = Vec::with_capacity(items.len() * 2);

        for item in items {
            let written_before = entries.len();

            // Empty attributes are not written, so stored attributes survive.
            if !item.attributes.is_empty() {
                entries.push((
                    self.attributes_key(type_name, &item.id),
                    serde_json::to_string(&item.attributes)?,
                ));
            }

            for (name, related) in &item.relationships {
                relationship_names.insert(name.clone());
                entries.push((
                    self.relationship_key(type_name, &item.id, name),
                    serde_json::to_string(related)?,
                ));
            }

            if entries.len() > written_before {
                ids.push(item.id.clone());
            }
        }

        if entries.is_empty() {
            return Ok(());
        }

        // Relationship index first, membership last: an id is never listed
        // before its keys exist.
        if !relationship_names.is_empty() {
            let names: Vec<String> = relationship_names.into_iter().collect();
            self.store
                .sadd(&self.all_relationships_key(type_name), &names)
                .await?;
        }
        self.store.mset(&entries).await?;
        self.store.sadd(&self.members_key(type_name), &ids).await?;

        tracing::debug!(type_name, items = ids.len(), keys = entries.len(), "merged cache data");
        Ok(())
    }

    async fn evict_all(&self, type_name: &str, ids: &[String]) -> DomainResult<()> {
        Self::validate_type(type_name)?;
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Ok(());
        }

        let known = self.known_relationships(type_name).await?;
        let mut keys = Vec::with_capacity(ids.len() * (known.len() + 1));
        for id in &ids {
            for relationship in &known {
                keys.push(self.relationship_key(type_name, id, relationship));
            }
            keys.push(self.attributes_key(type_name, id));
        }

        self.store.del(&keys).await?;
        self.store.srem(&self.members_key(type_name), &ids).await?;

        tracing::debug!(type_name, items = ids.len(), "evicted cache data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::instrumented::InstrumentedKeyValueStore;
    use crate::adapters::memory::InMemoryKeyValueStore;
    use serde_json::json;

    fn setup() -> (Arc<InstrumentedKeyValueStore<InMemoryKeyValueStore>>, KeyValueCache) {
        let store = Arc::new(InstrumentedKeyValueStore::new(Arc::new(InMemoryKeyValueStore::new())));
        let cache = KeyValueCache::new("test", store.clone());
        (store, cache)
    }

    #[tokio::test]
    async fn test_key_layout() {
        let (store, cache) = setup();
        let item = CacheData::new("i-1")
            .with_attribute("name", "web")
            .with_relationship("loadBalancers", ["lb-1"]);
        cache.merge("instances", &item).await.unwrap();

        let inner = store.inner();
        assert_eq!(
            inner.get("test:instances:attributes:i-1").await.unwrap().as_deref(),
            Some(r#"{"name":"web"}"#)
        );
        assert_eq!(
            inner
                .get("test:instances:relationships:i-1:loadBalancers")
                .await
                .unwrap()
                .as_deref(),
            Some(r#"["lb-1"]"#)
        );
        assert_eq!(
            inner.smembers("test:instances:relationships").await.unwrap(),
            vec!["loadBalancers".to_string()]
        );
        assert_eq!(inner.smembers("test:instances:members").await.unwrap(), vec!["i-1".to_string()]);
    }

    #[tokio::test]
    async fn test_merge_all_batches_into_three_calls() {
        let (store, cache) = setup();
        let items = vec![
            CacheData::new("a").with_attribute("n", 1).with_relationship("r", ["x"]),
            CacheData::new("b").with_attribute("n", 2).with_relationship("s", ["y"]),
            CacheData::new("c").with_attribute("n", 3),
        ];
        cache.merge_all("things", &items).await.unwrap();

        let counts = store.counts();
        assert_eq!(counts.mset.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(counts.sadd.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(store.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_inputs_make_no_store_calls() {
        let (store, cache) = setup();
        cache.merge_all("things", &[]).await.unwrap();
        cache.evict_all("things", &[]).await.unwrap();
        assert!(cache.get_all_by_ids("things", &[]).await.unwrap().is_empty());
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_all_by_ids_uses_one_mget() {
        let (store, cache) = setup();
        cache
            .merge_all(
                "things",
                &[
                    CacheData::new("a").with_attribute("n", 1).with_relationship("r", ["x"]),
                    CacheData::new("b").with_attribute("n", 2),
                ],
            )
            .await
            .unwrap();
        let before = store.counts().mget.load(std::sync::atomic::Ordering::SeqCst);

        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string(), "b".to_string()];
        let found = cache.get_all_by_ids("things", &ids).await.unwrap();

        assert_eq!(store.counts().mget.load(std::sync::atomic::Ordering::SeqCst), before + 1);
        let found_ids: Vec<&str> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(found_ids, vec!["b", "a"]);
        assert!(found[0].relationships.is_empty());
        assert!(found[1].related("r").unwrap().contains("x"));
    }

    #[tokio::test]
    async fn test_relationship_only_merge_is_not_found() {
        let (_store, cache) = setup();
        cache
            .merge("things", &CacheData::new("orphan").with_relationship("r", ["x"]))
            .await
            .unwrap();
        assert!(cache.get("things", "orphan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_is_upsert_per_relationship() {
        let (_store, cache) = setup();
        cache
            .merge(
                "instances",
                &CacheData::new("i-1")
                    .with_attribute("state", "running")
                    .with_relationship("loadBalancers", ["lb-1", "lb-2"])
                    .with_relationship("securityGroups", ["sg-1"]),
            )
            .await
            .unwrap();
        cache
            .merge("instances", &CacheData::new("i-1").with_relationship("loadBalancers", ["lb-3"]))
            .await
            .unwrap();

        let stored = cache.get("instances", "i-1").await.unwrap().unwrap();
        assert_eq!(stored.attributes.get("state"), Some(&json!("running")));
        assert_eq!(
            stored.related("loadBalancers").unwrap().iter().collect::<Vec<_>>(),
            vec!["lb-3"]
        );
        assert!(stored.related("securityGroups").unwrap().contains("sg-1"));
    }

    #[tokio::test]
    async fn test_evict_removes_keys_and_membership() {
        let (store, cache) = setup();
        cache
            .merge(
                "instances",
                &CacheData::new("i-1").with_attribute("a", 1).with_relationship("r", ["x"]),
            )
            .await
            .unwrap();

        cache.evict("instances", "i-1").await.unwrap();

        assert!(cache.get("instances", "i-1").await.unwrap().is_none());
        assert!(cache.get_identifiers("instances").await.unwrap().is_empty());
        assert_eq!(store.inner().string_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_type_names_are_rejected() {
        let (store, cache) = setup();
        let err = cache.get("bad:type", "x").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidType(_)));
        assert!(matches!(
            cache.merge_all("", &[CacheData::new("x")]).await,
            Err(DomainError::InvalidType(_))
        ));
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_a_serialization_error() {
        let (store, cache) = setup();
        cache
            .merge("things", &CacheData::new("a").with_attribute("n", 1))
            .await
            .unwrap();
        store.inner().set("test:things:attributes:a", "{broken").await.unwrap();

        let err = cache.get("things", "a").await.unwrap_err();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }

    #[tokio::test]
    async fn test_filter_identifiers() {
        let (_store, cache) = setup();
        cache
            .merge_all(
                "instances",
                &[
                    CacheData::new("aws:i-1").with_attribute("a", 1),
                    CacheData::new("aws:i-2").with_attribute("a", 2),
                    CacheData::new("gce:i-3").with_attribute("a", 3),
                ],
            )
            .await
            .unwrap();

        let mut matched = cache.filter_identifiers("instances", "aws:*").await.unwrap();
        matched.sort();
        assert_eq!(matched, vec!["aws:i-1".to_string(), "aws:i-2".to_string()]);
    }
}
