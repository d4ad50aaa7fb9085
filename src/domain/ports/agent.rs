//! Scheduling contract between the core and collector code.
//!
//! Collectors implement [`Agent`] (and usually [`CachingAgent`]) plus
//! [`AgentExecution`]; the core implements [`AgentScheduler`] and dispatches
//! every cycle through an [`ExecutionInstrumentation`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::domain::errors::InstrumentationError;
use crate::domain::models::CacheResult;

/// Stateless descriptor of a recurring unit of work.
pub trait Agent: Send + Sync {
    /// Identifier of this agent, unique across the fleet. Also the lock key
    /// used by the clustered scheduler.
    fn agent_type(&self) -> &str;

    /// Downcast to a caching agent when this agent produces cache data.
    fn as_caching_agent(&self) -> Option<&dyn CachingAgent> {
        None
    }
}

/// An agent that loads source-of-truth data destined for a cache.
#[async_trait]
pub trait CachingAgent: Agent {
    /// Fetch one snapshot of data. Re-running with unchanged sources must
    /// produce an equivalent result.
    async fn load_data(&self) -> anyhow::Result<CacheResult>;
}

/// The work performed on each firing of an agent.
#[async_trait]
pub trait AgentExecution: Send + Sync {
    async fn execute_agent(&self, agent: &dyn Agent) -> anyhow::Result<()>;
}

/// Observer hooks around one execution cycle.
///
/// Errors from `execution_started` or `execution_completed` are treated like
/// execution errors and reported through `execution_failed`. An error from
/// `execution_failed` terminates the agent's schedule.
#[async_trait]
pub trait ExecutionInstrumentation: Send + Sync {
    async fn execution_started(&self, agent: &dyn Agent) -> Result<(), InstrumentationError>;

    async fn execution_completed(&self, agent: &dyn Agent) -> Result<(), InstrumentationError>;

    async fn execution_failed(
        &self,
        agent: &dyn Agent,
        error: &anyhow::Error,
    ) -> Result<(), InstrumentationError>;
}

/// Why a schedule stopped firing.
#[derive(Debug)]
pub enum ScheduleExit {
    /// Cancelled through the handle, `unschedule` or `shutdown`.
    Cancelled,
    /// `execution_failed` itself failed; the schedule was terminated.
    InstrumentationFailed(InstrumentationError),
    /// The schedule task panicked.
    Panicked(String),
}

/// Handle to one registered recurring job.
#[derive(Debug)]
pub struct ScheduledAgent {
    agent_type: String,
    handle: JoinHandle<ScheduleExit>,
}

impl ScheduledAgent {
    /// Wrap the task running `agent_type`'s schedule.
    pub fn new(agent_type: impl Into<String>, handle: JoinHandle<ScheduleExit>) -> Self {
        Self {
            agent_type: agent_type.into(),
            handle,
        }
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Stop future firings. A cycle already in flight is left to finish.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// True once the schedule task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the schedule to stop and report why.
    pub async fn join(self) -> ScheduleExit {
        match self.handle.await {
            Ok(exit) => exit,
            Err(e) if e.is_cancelled() => ScheduleExit::Cancelled,
            Err(e) => ScheduleExit::Panicked(e.to_string()),
        }
    }
}

/// Registers agents for recurring execution.
pub trait AgentScheduler: Send + Sync {
    /// Start firing `execution` for `agent`. Must be called from within a
    /// tokio runtime. Scheduling an agent type again replaces its previous
    /// schedule.
    fn schedule(
        &self,
        agent: Arc<dyn Agent>,
        execution: Arc<dyn AgentExecution>,
        instrumentation: Arc<dyn ExecutionInstrumentation>,
    ) -> ScheduledAgent;

    /// Cancel the schedule of `agent_type`. Returns whether one existed.
    fn unschedule(&self, agent_type: &str) -> bool;

    /// Cancel every schedule.
    fn shutdown(&self);
}
