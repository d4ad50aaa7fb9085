//! Single-node recurring execution of agents.
//!
//! Every scheduled agent gets its own tokio task that fires at a fixed
//! interval (first firing immediate). Each firing runs one cycle on a
//! separate task, bounded by a semaphore shared by all agents of the
//! scheduler:
//!
//! ```text
//! execution_started -> execute_agent -> execution_completed
//!         \________________|___________________/
//!                          v (any error)
//!                   execution_failed
//! ```
//!
//! A failed cycle leaves the schedule running; a panicking collector counts
//! as a failed cycle. A failure of `execution_failed` itself terminates the
//! schedule of that agent.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::domain::errors::InstrumentationError;
use crate::domain::models::{OverlapPolicy, SchedulerConfig};
use crate::domain::ports::{
    Agent, AgentExecution, AgentScheduler, ExecutionInstrumentation, ScheduleExit, ScheduledAgent,
};

/// Why a firing did not execute its agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// This node has no valid identity to own a lock with.
    IdentityUnresolved,
    /// Another node holds the agent's lock.
    LockHeld,
    /// The lock service could not be reached.
    LockServiceError(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityUnresolved => f.write_str("node identity unresolved"),
            Self::LockHeld => f.write_str("lock held by another node"),
            Self::LockServiceError(e) => write!(f, "lock service error: {e}"),
        }
    }
}

/// Result of one firing that did not break the schedule.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed,
    /// Reported through `execution_failed`.
    Failed(anyhow::Error),
    Skipped(SkipReason),
}

/// `Err` only when `execution_failed` itself failed.
pub type CycleResult = Result<CycleOutcome, InstrumentationError>;

fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// Run started, execute and completed, stopping at the first error. A panic
/// in any of them is returned as an error.
pub(crate) async fn attempt(
    agent: &dyn Agent,
    execution: &dyn AgentExecution,
    instrumentation: &dyn ExecutionInstrumentation,
) -> anyhow::Result<()> {
    let sequence = async {
        instrumentation.execution_started(agent).await?;
        execution.execute_agent(agent).await?;
        instrumentation.execution_completed(agent).await?;
        Ok::<(), anyhow::Error>(())
    };

    match AssertUnwindSafe(sequence).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "Agent {} panicked: {}",
            agent.agent_type(),
            panic_payload_message(payload)
        )),
    }
}

/// Report a failed attempt through `execution_failed`.
pub(crate) async fn report_failure(
    agent: &dyn Agent,
    instrumentation: &dyn ExecutionInstrumentation,
    error: anyhow::Error,
) -> CycleResult {
    tracing::warn!(agent_type = agent.agent_type(), error = %error, "Agent execution failed");
    instrumentation.execution_failed(agent, &error).await?;
    Ok(CycleOutcome::Failed(error))
}

/// One firing of an agent, without any locking.
pub async fn run_cycle(
    agent: &dyn Agent,
    execution: &dyn AgentExecution,
    instrumentation: &dyn ExecutionInstrumentation,
) -> CycleResult {
    match attempt(agent, execution, instrumentation).await {
        Ok(()) => Ok(CycleOutcome::Completed),
        Err(e) => report_failure(agent, instrumentation, e).await,
    }
}

pub(crate) type CycleFn = Arc<dyn Fn() -> BoxFuture<'static, CycleResult> + Send + Sync>;

type Registry = Arc<Mutex<HashMap<String, (Uuid, AbortHandle)>>>;

/// Registry entry of one schedule task, removed when the task ends by any
/// path, abort included. A replacement registered under the same agent type
/// is left alone.
struct Registration {
    schedules: Registry,
    agent_type: String,
    id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.get(&self.agent_type).is_some_and(|(current, _)| *current == self.id) {
            registry.remove(&self.agent_type);
        }
    }
}

/// Fires cycles at a fixed interval and tracks one schedule per agent type.
///
/// Shared by the single-node and clustered schedulers; they differ only in
/// what a cycle does.
pub(crate) struct ScheduleRunner {
    interval: Duration,
    overlap_policy: OverlapPolicy,
    permits: Arc<Semaphore>,
    schedules: Registry,
}

impl ScheduleRunner {
    pub(crate) fn new(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            overlap_policy: config.overlap_policy,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            schedules: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn spawn(&self, agent_type: String, cycle: CycleFn) -> ScheduledAgent {
        let registration = Registration {
            schedules: self.schedules.clone(),
            agent_type: agent_type.clone(),
            id: Uuid::new_v4(),
        };
        let id = registration.id;

        // The task waits until its entry exists, so its exit always finds it.
        let (registered_tx, registered_rx) = oneshot::channel();
        let handle = tokio::spawn(run_schedule(
            registration,
            registered_rx,
            self.interval,
            self.overlap_policy,
            self.permits.clone(),
            cycle,
        ));
        let previous = self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_type.clone(), (id, handle.abort_handle()));
        let _ = registered_tx.send(());

        if let Some((_, previous)) = previous {
            tracing::info!(agent_type = %agent_type, "Replacing existing schedule");
            previous.abort();
        }

        tracing::info!(
            agent_type = %agent_type,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            overlap_policy = self.overlap_policy.as_str(),
            "Agent scheduled"
        );
        ScheduledAgent::new(agent_type, handle)
    }

    pub(crate) fn cancel(&self, agent_type: &str) -> bool {
        let removed = self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_type);
        match removed {
            Some((_, handle)) => {
                handle.abort();
                tracing::info!(agent_type, "Agent unscheduled");
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&self) {
        let drained: Vec<_> = self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        tracing::info!(count = drained.len(), "All agent schedules cancelled");
    }

    pub(crate) fn scheduled_types(&self) -> Vec<String> {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

fn log_outcome(agent_type: &str, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed => tracing::debug!(agent_type, "Cycle completed"),
        CycleOutcome::Failed(_) => {}
        CycleOutcome::Skipped(reason) => tracing::debug!(agent_type, reason = %reason, "Cycle skipped"),
    }
}

async fn run_schedule(
    registration: Registration,
    registered: oneshot::Receiver<()>,
    interval: Duration,
    overlap_policy: OverlapPolicy,
    permits: Arc<Semaphore>,
    cycle: CycleFn,
) -> ScheduleExit {
    let agent_type = registration.agent_type.clone();
    let _ = registered.await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // At most one cycle of this agent at a time under `Skip`.
    let running = Arc::new(Semaphore::new(1));
    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel::<InstrumentationError>();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let overlap_permit = match overlap_policy {
                    OverlapPolicy::Allow => None,
                    OverlapPolicy::Skip => match running.clone().try_acquire_owned() {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            tracing::debug!(agent_type = %agent_type, "Previous cycle still running, skipping firing");
                            continue;
                        }
                    },
                };

                let cycle = cycle.clone();
                let permits = permits.clone();
                let failed_tx = failed_tx.clone();
                let agent_type = agent_type.clone();
                // Cycles are detached so cancelling the schedule lets them finish.
                tokio::spawn(async move {
                    let _overlap_permit = overlap_permit;
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    match cycle().await {
                        Ok(outcome) => log_outcome(&agent_type, &outcome),
                        Err(e) => {
                            let _ = failed_tx.send(e);
                        }
                    }
                });
            }
            Some(error) = failed_rx.recv() => {
                tracing::error!(
                    agent_type = %agent_type,
                    error = %error,
                    "Failure instrumentation failed, terminating schedule"
                );
                return ScheduleExit::InstrumentationFailed(error);
            }
        }
    }
}

/// [`AgentScheduler`] for a single process: every firing executes.
pub struct DefaultAgentScheduler {
    runner: ScheduleRunner,
}

impl DefaultAgentScheduler {
    /// Scheduler firing every agent at the configured interval.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            runner: ScheduleRunner::new(config),
        }
    }

    /// Agent types with an active schedule.
    pub fn scheduled_types(&self) -> Vec<String> {
        self.runner.scheduled_types()
    }
}

impl AgentScheduler for DefaultAgentScheduler {
    fn schedule(
        &self,
        agent: Arc<dyn Agent>,
        execution: Arc<dyn AgentExecution>,
        instrumentation: Arc<dyn ExecutionInstrumentation>,
    ) -> ScheduledAgent {
        let agent_type = agent.agent_type().to_string();
        let cycle: CycleFn = Arc::new(move || {
            let agent = agent.clone();
            let execution = execution.clone();
            let instrumentation = instrumentation.clone();
            async move { run_cycle(agent.as_ref(), execution.as_ref(), instrumentation.as_ref()).await }
                .boxed()
        });
        self.runner.spawn(agent_type, cycle)
    }

    fn unschedule(&self, agent_type: &str) -> bool {
        self.runner.cancel(agent_type)
    }

    fn shutdown(&self) {
        self.runner.cancel_all();
    }
}

impl Drop for DefaultAgentScheduler {
    fn drop(&mut self) {
        self.runner.cancel_all();
    }
}
