//! In-process [`KeyValueStore`] for tests and single-process deployments.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::ports::KeyValueStore;

#[derive(Debug, Default)]
struct StoreState {
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// Key-value store held in memory behind an async read-write lock.
///
/// Each call is atomic with respect to other calls, which is stronger than
/// what the cache layer relies on.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    state: RwLock<StoreState>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of string keys currently stored.
    pub async fn string_count(&self) -> usize {
        self.state.read().await.strings.len()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.read().await.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let state = self.state.read().await;
        Ok(keys.iter().map(|k| state.strings.get(k).cloned()).collect())
    }

    async fn mset(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for (key, value) in entries {
            state.strings.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for key in keys {
            let had_string = state.strings.remove(key).is_some();
            let had_set = state.sets.remove(key).is_some();
            if had_string || had_set {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let set = state.sets.entry(key.to_string()).or_default();
        let added = members.iter().filter(|m| set.insert((*m).clone())).count();
        Ok(added as u64)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(0);
        };
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed as u64)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
