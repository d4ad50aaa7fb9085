//! Domain models.

pub mod cache_data;
pub mod config;
pub mod identifier_glob;

pub use cache_data::{Attributes, CacheData, CacheResult, Relationships};
pub use config::{
    CacheConfig, ClusterConfig, Config, IdentityConfig, LoggingConfig, OverlapPolicy,
    SchedulerConfig, StoreBackend, StoreConfig,
};
pub use identifier_glob::IdentifierGlob;
