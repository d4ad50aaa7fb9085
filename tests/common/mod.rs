//! Common test utilities for integration tests
//!
//! Provides fakes for the scheduling contract (agents, executions,
//! instrumentation) and store helpers shared across test files.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetcache::adapters::sqlite::{create_migrated_test_pool, SqliteKeyValueStore};
use fleetcache::domain::errors::{InstrumentationError, StoreError};
use fleetcache::domain::ports::{Agent, AgentExecution, ExecutionInstrumentation, KeyValueStore};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    predicate()
}

/// Migrated in-memory SQLite store.
pub async fn sqlite_store() -> Arc<SqliteKeyValueStore> {
    let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
    Arc::new(SqliteKeyValueStore::new(pool))
}

/// Agent that only carries a type.
pub struct TestAgent {
    agent_type: String,
}

impl TestAgent {
    pub fn new(agent_type: &str) -> Arc<Self> {
        Arc::new(Self {
            agent_type: agent_type.to_string(),
        })
    }
}

impl Agent for TestAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }
}

/// Execution that counts calls and tracks how many run at once.
#[derive(Default)]
pub struct CountingExecution {
    pub calls: AtomicUsize,
    pub finished: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Option<Duration>,
}

impl CountingExecution {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let execution = Self::default();
        execution.fail.store(true, Ordering::SeqCst);
        Arc::new(execution)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentExecution for CountingExecution {
    async fn execute_agent(&self, agent: &dyn Agent) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("collector for {} failed", agent.agent_type());
        }
        Ok(())
    }
}

/// One observed instrumentation callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Completed(String),
    Failed(String, String),
}

/// Instrumentation that records every callback.
#[derive(Default)]
pub struct RecordingInstrumentation {
    events: Mutex<Vec<Event>>,
    pub fail_on_failed: AtomicBool,
}

impl RecordingInstrumentation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on_failed() -> Arc<Self> {
        let instrumentation = Self::default();
        instrumentation.fail_on_failed.store(true, Ordering::SeqCst);
        Arc::new(instrumentation)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.count(|e| matches!(e, Event::Started(_)))
    }

    pub fn completed(&self) -> usize {
        self.count(|e| matches!(e, Event::Completed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|e| matches!(e, Event::Failed(..)))
    }

    pub fn failure_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Failed(_, message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl ExecutionInstrumentation for RecordingInstrumentation {
    async fn execution_started(&self, agent: &dyn Agent) -> Result<(), InstrumentationError> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Started(agent.agent_type().to_string()));
        Ok(())
    }

    async fn execution_completed(&self, agent: &dyn Agent) -> Result<(), InstrumentationError> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Completed(agent.agent_type().to_string()));
        Ok(())
    }

    async fn execution_failed(
        &self,
        agent: &dyn Agent,
        error: &anyhow::Error,
    ) -> Result<(), InstrumentationError> {
        self.events.lock().unwrap().push(Event::Failed(
            agent.agent_type().to_string(),
            error.to_string(),
        ));
        if self.fail_on_failed.load(Ordering::SeqCst) {
            return Err(InstrumentationError::new(
                "execution_failed",
                agent.agent_type(),
                "metrics sink unavailable",
            ));
        }
        Ok(())
    }
}

/// Store whose every call fails, as an unreachable server would.
pub struct UnreachableStore;

fn refused() -> StoreError {
    StoreError::Connection("connection refused".to_string())
}

#[async_trait]
impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(refused())
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        Err(refused())
    }

    async fn mset(&self, _entries: &[(String, String)]) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn del(&self, _keys: &[String]) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn sadd(&self, _key: &str, _members: &[String]) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn srem(&self, _key: &str, _members: &[String]) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn smembers(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        Err(refused())
    }
}
