//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters and collectors
//! implement:
//! - Cache / WriteableCache: entity reads and writes
//! - KeyValueStore: the flat store the key-value cache is encoded onto
//! - LockService: time-boxed distributed locks
//! - Agent / AgentExecution / ExecutionInstrumentation / AgentScheduler:
//!   recurring caching agent execution

pub mod agent;
pub mod cache;
pub mod key_value_store;
pub mod lock_service;

pub use agent::{
    Agent, AgentExecution, AgentScheduler, CachingAgent, ExecutionInstrumentation, ScheduleExit,
    ScheduledAgent,
};
pub use cache::{Cache, WriteableCache};
pub use key_value_store::KeyValueStore;
pub use lock_service::LockService;
