//! Fleetcache - Distributed Entity Cache
//!
//! Fleetcache stores denormalized entity snapshots ("cache data") written by
//! periodically scheduled collector jobs ("caching agents") and serves them
//! through one query interface that can merge several underlying caches.
//! Agents can be scheduled on every node of a fleet while a distributed
//! lock keeps each agent executing on at most one node at a time.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Entity model, errors and port traits
//! - **Service Layer** (`services`): Caches, node identity and schedulers
//! - **Adapters** (`adapters`): In-memory and `SQLite` stores and lock services
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fleetcache::{
//!     AgentScheduler, CachingAgentExecution, ClusteredAgentScheduler, ConfigLoader,
//!     KeyValueCache, LoggingInstrumentation, NodeIdentity, StoreBackends,
//! };
//! use fleetcache::infrastructure::logging::{LogConfig, LoggerImpl};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let _logger = LoggerImpl::start(&LogConfig::from(&config.logging)).await?;
//!     let backends = StoreBackends::connect(&config.store).await?;
//!     let cache = Arc::new(KeyValueCache::from_config(&config.cache, backends.store.clone()));
//!
//!     let scheduler = ClusteredAgentScheduler::new(
//!         &config.scheduler,
//!         &config.cluster,
//!         backends.locks.clone(),
//!         Arc::new(NodeIdentity::from_config(&config.identity)),
//!     );
//!     scheduler.schedule(
//!         Arc::new(MyAgent),
//!         Arc::new(CachingAgentExecution::new(cache)),
//!         Arc::new(LoggingInstrumentation::new()),
//!     );
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::StoreBackends;
pub use domain::errors::{DomainError, DomainResult, InstrumentationError, StoreError};
pub use domain::models::{
    CacheConfig, CacheData, CacheResult, ClusterConfig, Config, IdentityConfig, LoggingConfig,
    OverlapPolicy, SchedulerConfig, StoreBackend, StoreConfig,
};
pub use domain::ports::{
    Agent, AgentExecution, AgentScheduler, Cache, CachingAgent, ExecutionInstrumentation,
    KeyValueStore, LockService, ScheduleExit, ScheduledAgent, WriteableCache,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CachingAgentExecution, ClusteredAgentScheduler, CompositeCache, CycleOutcome,
    DefaultAgentScheduler, KeyValueCache, LoggingInstrumentation, NodeIdentity, SkipReason,
};
