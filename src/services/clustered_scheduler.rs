//! Fleet-wide scheduling: every node schedules every agent, but a firing
//! only executes on the node that takes the agent's lock.
//!
//! The lock is held for a TTL and extended by a heartbeat while the cycle
//! runs. If the heartbeat fails the cycle is abandoned and reported as
//! failed; a crashed node's lock simply expires.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::domain::errors::DomainError;
use crate::domain::models::{ClusterConfig, SchedulerConfig};
use crate::domain::ports::{
    Agent, AgentExecution, AgentScheduler, ExecutionInstrumentation, LockService, ScheduledAgent,
};
use crate::services::agent_scheduler::{
    attempt, report_failure, CycleFn, CycleOutcome, CycleResult, ScheduleRunner, SkipReason,
};
use crate::services::node_identity::NodeIdentity;

/// Marks an agent type as executing on this node until dropped.
struct LocalActivity<'a> {
    active: &'a Mutex<HashSet<String>>,
    agent_type: String,
}

impl<'a> LocalActivity<'a> {
    fn enter(active: &'a Mutex<HashSet<String>>, agent_type: &str) -> Option<Self> {
        let inserted = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_type.to_string());
        inserted.then(|| Self {
            active,
            agent_type: agent_type.to_string(),
        })
    }
}

impl Drop for LocalActivity<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.agent_type);
    }
}

/// A held agent lock and the task extending it.
///
/// Dropping it without [`HeldLock::release`], as happens when a `run_cycle`
/// future is dropped mid-execution, still stops the heartbeat and releases
/// the lock in the background.
struct HeldLock {
    lock_service: Arc<dyn LockService>,
    key: String,
    owner: String,
    heartbeat: AbortHandle,
    released: bool,
}

impl HeldLock {
    async fn release(mut self) {
        self.heartbeat.abort();
        let result = self.lock_service.release(&self.key, &self.owner).await;
        self.released = true;
        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "Failed to release agent lock");
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        self.heartbeat.abort();
        if self.released {
            return;
        }

        tracing::warn!(key = %self.key, "Cycle abandoned while holding agent lock");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let lock_service = self.lock_service.clone();
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        runtime.spawn(async move {
            if let Err(e) = lock_service.release(&key, &owner).await {
                tracing::warn!(key = %key, error = %e, "Failed to release abandoned agent lock");
            }
        });
    }
}

struct LockedCycle {
    lock_service: Arc<dyn LockService>,
    identity: Arc<NodeIdentity>,
    lock_prefix: String,
    lock_ttl: Duration,
    heartbeat_interval: Duration,
    // Lock acquisition is reentrant per owner, so overlapping firings on
    // this node are excluded here.
    active: Mutex<HashSet<String>>,
}

impl LockedCycle {
    fn lock_key(&self, agent_type: &str) -> String {
        format!("{}{}", self.lock_prefix, agent_type)
    }

    async fn run(
        &self,
        agent: &dyn Agent,
        execution: &dyn AgentExecution,
        instrumentation: &dyn ExecutionInstrumentation,
    ) -> CycleResult {
        let agent_type = agent.agent_type();
        let identity = self.identity.get().await;
        if !identity.is_valid() {
            tracing::warn!(agent_type, identity = %identity, "Skipping cycle without a valid node identity");
            return Ok(CycleOutcome::Skipped(SkipReason::IdentityUnresolved));
        }
        let owner = identity.as_str();
        let key = self.lock_key(agent_type);

        let Some(_activity) = LocalActivity::enter(&self.active, agent_type) else {
            return Ok(CycleOutcome::Skipped(SkipReason::LockHeld));
        };

        match self.lock_service.acquire(&key, owner, self.lock_ttl).await {
            Ok(true) => tracing::debug!(agent_type, owner, "Agent lock acquired"),
            Ok(false) => return Ok(CycleOutcome::Skipped(SkipReason::LockHeld)),
            Err(e) => {
                tracing::warn!(agent_type, error = %e, "Lock service unavailable, skipping cycle");
                return Ok(CycleOutcome::Skipped(SkipReason::LockServiceError(e.to_string())));
            }
        }

        let (lost_tx, mut lost_rx) = watch::channel(false);
        let held = HeldLock {
            lock_service: self.lock_service.clone(),
            key: key.clone(),
            owner: owner.to_string(),
            heartbeat: tokio::spawn(heartbeat(
                self.lock_service.clone(),
                key.clone(),
                owner.to_string(),
                self.lock_ttl,
                self.heartbeat_interval,
                lost_tx,
            ))
            .abort_handle(),
            released: false,
        };

        // Dropping the attempt future cancels the execution at its next await.
        let attempted = tokio::select! {
            result = attempt(agent, execution, instrumentation) => result,
            _ = lost_rx.wait_for(|lost| *lost) => Err(DomainError::LockLostDuringExecution {
                agent_type: agent_type.to_string(),
            }
            .into()),
        };

        held.release().await;

        match attempted {
            Ok(()) => Ok(CycleOutcome::Completed),
            Err(e) => report_failure(agent, instrumentation, e).await,
        }
    }
}

/// Extends the lock until it fails, then flags the loss.
async fn heartbeat(
    lock_service: Arc<dyn LockService>,
    key: String,
    owner: String,
    ttl: Duration,
    interval: Duration,
    lost: watch::Sender<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match lock_service.heartbeat(&key, &owner, ttl).await {
            Ok(true) => tracing::trace!(key = %key, "Agent lock extended"),
            Ok(false) => {
                tracing::warn!(key = %key, owner = %owner, "Agent lock lost to another owner");
                break;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Agent lock heartbeat failed");
                break;
            }
        }
    }
    lost.send_replace(true);
}

/// [`AgentScheduler`] safe to run on every node of a fleet.
pub struct ClusteredAgentScheduler {
    runner: ScheduleRunner,
    cycle: Arc<LockedCycle>,
}

impl ClusteredAgentScheduler {
    /// Scheduler taking per-agent locks from `lock_service` as `identity`.
    pub fn new(
        scheduler: &SchedulerConfig,
        cluster: &ClusterConfig,
        lock_service: Arc<dyn LockService>,
        identity: Arc<NodeIdentity>,
    ) -> Self {
        Self {
            runner: ScheduleRunner::new(scheduler),
            cycle: Arc::new(LockedCycle {
                lock_service,
                identity,
                lock_prefix: cluster.lock_prefix.clone(),
                lock_ttl: Duration::from_millis(cluster.lock_ttl_ms),
                heartbeat_interval: Duration::from_millis(cluster.effective_heartbeat_interval_ms()),
                active: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// One lock-guarded firing of an agent.
    pub async fn run_cycle(
        &self,
        agent: &dyn Agent,
        execution: &dyn AgentExecution,
        instrumentation: &dyn ExecutionInstrumentation,
    ) -> CycleResult {
        self.cycle.run(agent, execution, instrumentation).await
    }

    /// Agent types with an active schedule.
    pub fn scheduled_types(&self) -> Vec<String> {
        self.runner.scheduled_types()
    }
}

impl AgentScheduler for ClusteredAgentScheduler {
    fn schedule(
        &self,
        agent: Arc<dyn Agent>,
        execution: Arc<dyn AgentExecution>,
        instrumentation: Arc<dyn ExecutionInstrumentation>,
    ) -> ScheduledAgent {
        let agent_type = agent.agent_type().to_string();
        let locked = self.cycle.clone();
        let cycle: CycleFn = Arc::new(move || {
            let locked = locked.clone();
            let agent = agent.clone();
            let execution = execution.clone();
            let instrumentation = instrumentation.clone();
            async move {
                locked
                    .run(agent.as_ref(), execution.as_ref(), instrumentation.as_ref())
                    .await
            }
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

impl Drop for ClusteredAgentScheduler {
    fn drop(&mut self) {
        self.runner.cancel_all();
    }
}
