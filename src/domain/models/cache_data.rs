//! Cache entity model.
//!
//! A [`CacheData`] is one `(type, id)` record: an attribute map plus named
//! relationship sets pointing at ids in other type namespaces. Instances are
//! value objects produced by caching agents each cycle; persisted state only
//! lives in the backing store.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Attribute map of an entity.
pub type Attributes = HashMap<String, serde_json::Value>;

/// Relationship name -> set of related ids.
pub type Relationships = HashMap<String, BTreeSet<String>>;

/// A denormalized entity snapshot scoped to a type namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheData {
    /// Id, unique within its type.
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: Relationships,
}

impl CacheData {
    /// Entity with no attributes or relationships.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
            relationships: Relationships::new(),
        }
    }

    /// Set one attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace the relationship `name` with the given ids. Duplicates collapse.
    pub fn with_relationship<I, S>(mut self, name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships
            .insert(name.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    /// Ids related through `name`, if the relationship is present.
    pub fn related(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.relationships.get(name)
    }
}

/// Output of one caching agent load: items to merge and ids to evict, per type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheResult {
    pub cache_results: HashMap<String, Vec<CacheData>>,
    pub evictions: HashMap<String, Vec<String>>,
}

impl CacheResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(mut self, type_name: impl Into<String>, items: Vec<CacheData>) -> Self {
        self.cache_results.entry(type_name.into()).or_default().extend(items);
        self
    }

    pub fn with_evictions(mut self, type_name: impl Into<String>, ids: Vec<String>) -> Self {
        self.evictions.entry(type_name.into()).or_default().extend(ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cache_results.values().all(Vec::is_empty) && self.evictions.values().all(Vec::is_empty)
    }
}
