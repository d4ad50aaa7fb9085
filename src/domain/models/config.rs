//! Configuration model, deserialized by the config loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure for fleetcache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Key-value cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Single-node scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Clustered scheduler (distributed lock) configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Node identity probe configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Backing store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Key-value cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Prefix of every key written by the cache
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
}

fn default_cache_prefix() -> String {
    "fleetcache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_cache_prefix(),
        }
    }
}

/// What a scheduler does when a firing arrives while the previous cycle of
/// the same agent is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start the new cycle regardless; cycles of one agent may overlap.
    #[default]
    Allow,
    /// Skip the firing until the running cycle finishes.
    Skip,
}

impl OverlapPolicy {
    /// Name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Skip => "skip",
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Interval between firings of each agent, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Maximum number of agent cycles running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Behaviour when a firing overlaps a running cycle
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
}

const fn default_interval_ms() -> u64 {
    60_000
}

fn default_max_concurrency() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_concurrency: default_max_concurrency(),
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

/// Clustered scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    /// Lifetime of an agent lock before it must be extended, in milliseconds
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    /// Heartbeat period in milliseconds; a third of the TTL when unset
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,

    /// Prefix of lock names; the agent type is appended
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,
}

const fn default_lock_ttl_ms() -> u64 {
    300_000
}

fn default_lock_prefix() -> String {
    "agent-lock:".to_string()
}

impl ClusterConfig {
    /// Effective heartbeat period.
    pub fn effective_heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms
            .unwrap_or(self.lock_ttl_ms / 3)
            .max(1)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: default_lock_ttl_ms(),
            heartbeat_interval_ms: None,
            lock_prefix: default_lock_prefix(),
        }
    }
}

/// Node identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdentityConfig {
    /// Host contacted to force selection of a routable local address
    #[serde(default = "default_validation_host")]
    pub validation_host: String,

    /// Port on the validation host
    #[serde(default = "default_validation_port")]
    pub validation_port: u16,

    /// Connect timeout for each probed address, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Age after which a cached identity is recomputed, in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_validation_host() -> String {
    "www.google.com".to_string()
}

const fn default_validation_port() -> u16 {
    80
}

const fn default_probe_timeout_ms() -> u64 {
    125
}

const fn default_refresh_interval_secs() -> u64 {
    30
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            validation_host: default_validation_host(),
            validation_port: default_validation_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

/// Which backing store implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StoreBackend,

    /// Path to the `SQLite` database file (sqlite backend only)
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for another connection's lock, in ms
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> String {
    ".fleetcache/cache.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}
