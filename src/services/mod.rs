//! Application services: cache implementations over the ports, node
//! identity, and the agent schedulers.

pub mod agent_scheduler;
pub mod caching_agent_execution;
pub mod clustered_scheduler;
pub mod composite_cache;
pub mod instrumentation;
pub mod kv_cache;
pub mod node_identity;

pub use agent_scheduler::{run_cycle, CycleOutcome, CycleResult, DefaultAgentScheduler, SkipReason};
pub use caching_agent_execution::CachingAgentExecution;
pub use clustered_scheduler::ClusteredAgentScheduler;
pub use composite_cache::CompositeCache;
pub use instrumentation::LoggingInstrumentation;
pub use kv_cache::KeyValueCache;
pub use node_identity::{AddressProbe, Identity, NetworkInterfaceProbe, NodeIdentity};
