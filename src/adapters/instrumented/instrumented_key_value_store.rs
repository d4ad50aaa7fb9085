//! Call-counting, tracing decorator for any [`KeyValueStore`].
//!
//! Wraps the store-client interface itself, so every backend gets the same
//! per-operation counters and timing events without knowing about them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::domain::errors::StoreError;
use crate::domain::ports::KeyValueStore;

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct StoreCallCounts {
    pub get: AtomicU64,
    pub set: AtomicU64,
    pub mget: AtomicU64,
    pub mset: AtomicU64,
    pub del: AtomicU64,
    pub sadd: AtomicU64,
    pub srem: AtomicU64,
    pub smembers: AtomicU64,
}

impl StoreCallCounts {
    /// Sum over all operations.
    pub fn total(&self) -> u64 {
        [
            &self.get,
            &self.set,
            &self.mget,
            &self.mset,
            &self.del,
            &self.sadd,
            &self.srem,
            &self.smembers,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

/// Counts calls per operation before delegating to an inner store.
pub struct InstrumentedKeyValueStore<S: KeyValueStore> {
    inner: Arc<S>,
    counts: Arc<StoreCallCounts>,
}

impl<S: KeyValueStore> InstrumentedKeyValueStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            counts: Arc::new(StoreCallCounts::default()),
        }
    }

    /// Shared per-operation counters.
    pub fn counts(&self) -> Arc<StoreCallCounts> {
        self.counts.clone()
    }

    pub fn total_calls(&self) -> u64 {
        self.counts.total()
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

fn record<T>(op: &'static str, keys: usize, started: Instant, result: &Result<T, StoreError>) {
    let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    match result {
        Ok(_) => tracing::trace!(op, keys, elapsed_us, "store call"),
        Err(e) => tracing::warn!(op, keys, elapsed_us, error = %e, "store call failed"),
    }
}

#[async_trait]
impl<S: KeyValueStore + 'static> KeyValueStore for InstrumentedKeyValueStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.counts.get.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.get(key).await;
        record("get", 1, started, &result);
        result
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.counts.set.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.set(key, value).await;
        record("set", 1, started, &result);
        result
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.counts.mget.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.mget(keys).await;
        record("mget", keys.len(), started, &result);
        result
    }

    async fn mset(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        self.counts.mset.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.mset(entries).await;
        record("mset", entries.len(), started, &result);
        result
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.counts.del.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.del(keys).await;
        record("del", keys.len(), started, &result);
        result
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        self.counts.sadd.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.sadd(key, members).await;
        record("sadd", members.len(), started, &result);
        result
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        self.counts.srem.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.srem(key, members).await;
        record("srem", members.len(), started, &result);
        result
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.counts.smembers.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.smembers(key).await;
        record("smembers", 1, started, &result);
        result
    }
}
