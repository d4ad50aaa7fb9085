//! [`ExecutionInstrumentation`] that reports cycles through `tracing`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::errors::InstrumentationError;
use crate::domain::ports::{Agent, ExecutionInstrumentation};

/// Logs start at debug, completion with elapsed time at info and failures
/// at warn. Never fails.
#[derive(Default)]
pub struct LoggingInstrumentation {
    started: Mutex<HashMap<String, Instant>>,
}

impl LoggingInstrumentation {
    /// Instrumentation with no cycles in flight.
    pub fn new() -> Self {
        Self::default()
    }

    async fn elapsed_ms(&self, agent_type: &str) -> Option<u64> {
        self.started
            .lock()
            .await
            .remove(agent_type)
            .map(|started| u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl ExecutionInstrumentation for LoggingInstrumentation {
    async fn execution_started(&self, agent: &dyn Agent) -> Result<(), InstrumentationError> {
        let agent_type = agent.agent_type();
        self.started
            .lock()
            .await
            .insert(agent_type.to_string(), Instant::now());
        tracing::debug!(agent_type, "Agent execution started");
        Ok(())
    }

    async fn execution_completed(&self, agent: &dyn Agent) -> Result<(), InstrumentationError> {
        let agent_type = agent.agent_type();
        let elapsed_ms = self.elapsed_ms(agent_type).await;
        tracing::info!(agent_type, elapsed_ms, "Agent execution completed");
        Ok(())
    }

    async fn execution_failed(
        &self,
        agent: &dyn Agent,
        error: &anyhow::Error,
    ) -> Result<(), InstrumentationError> {
        let agent_type = agent.agent_type();
        let elapsed_ms = self.elapsed_ms(agent_type).await;
        tracing::warn!(agent_type, elapsed_ms, error = %format!("{error:#}"), "Agent execution failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestAgent;

    impl Agent for TestAgent {
        fn agent_type(&self) -> &str {
            "test/logging"
        }
    }

    #[tokio::test]
    async fn test_start_instants_are_cleared() {
        let instrumentation = LoggingInstrumentation::new();
        instrumentation.execution_started(&TestAgent).await.unwrap();
        assert_eq!(instrumentation.started.lock().await.len(), 1);

        instrumentation.execution_completed(&TestAgent).await.unwrap();
        assert!(instrumentation.started.lock().await.is_empty());

        instrumentation.execution_started(&TestAgent).await.unwrap();
        instrumentation
            .execution_failed(&TestAgent, &anyhow::anyhow!("boom"))
            .await
            .unwrap();
        assert!(instrumentation.started.lock().await.is_empty());
    }
}
