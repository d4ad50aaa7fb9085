//! Layered configuration loading: defaults, then YAML files, then environment.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid cache prefix: {0:?}. Must be non-empty and contain no ':'")]
    InvalidCachePrefix(String),

    #[error("Invalid scheduler interval_ms: {0}. Must be positive")]
    InvalidInterval(u64),

    #[error("Invalid max_concurrency: {0}. Must be at least 1")]
    InvalidMaxConcurrency(usize),

    #[error("Invalid lock_ttl_ms: {0}. Must be positive")]
    InvalidLockTtl(u64),

    #[error("Invalid heartbeat_interval_ms: {0}. Must be positive and less than lock_ttl_ms ({1})")]
    InvalidHeartbeat(u64, u64),

    #[error("Lock prefix cannot be empty")]
    EmptyLockPrefix,

    #[error("Invalid probe_timeout_ms: {0}. Must be positive")]
    InvalidProbeTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .fleetcache/config.yaml (node config)
    /// 3. .fleetcache/local.yaml (local overrides, optional)
    /// 4. Environment variables (FLEETCACHE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".fleetcache/config.yaml"))
            .merge(Yaml::file(".fleetcache/local.yaml"))
            .merge(Env::prefixed("FLEETCACHE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let prefix = &config.cache.prefix;
        if prefix.is_empty() || prefix.contains(':') {
            return Err(ConfigError::InvalidCachePrefix(prefix.clone()));
        }

        if config.scheduler.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(config.scheduler.interval_ms));
        }

        if config.scheduler.max_concurrency == 0 {
            return Err(ConfigError::InvalidMaxConcurrency(
                config.scheduler.max_concurrency,
            ));
        }

        let cluster = &config.cluster;
        if cluster.lock_ttl_ms == 0 {
            return Err(ConfigError::InvalidLockTtl(cluster.lock_ttl_ms));
        }

        if let Some(heartbeat) = cluster.heartbeat_interval_ms {
            if heartbeat == 0 || heartbeat >= cluster.lock_ttl_ms {
                return Err(ConfigError::InvalidHeartbeat(heartbeat, cluster.lock_ttl_ms));
            }
        }

        if cluster.lock_prefix.is_empty() {
            return Err(ConfigError::EmptyLockPrefix);
        }

        if config.identity.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidProbeTimeout(config.identity.probe_timeout_ms));
        }

        if config.store.database_path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.store.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.store.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{OverlapPolicy, StoreBackend};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.prefix, "fleetcache");
        assert_eq!(config.scheduler.interval_ms, 60_000);
        assert!(config.scheduler.max_concurrency >= 1);
        assert_eq!(config.scheduler.overlap_policy, OverlapPolicy::Allow);
        assert_eq!(config.cluster.lock_ttl_ms, 300_000);
        assert_eq!(config.cluster.effective_heartbeat_interval_ms(), 100_000);
        assert_eq!(config.cluster.lock_prefix, "agent-lock:");
        assert_eq!(config.identity.validation_host, "www.google.com");
        assert_eq!(config.identity.probe_timeout_ms, 125);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
cache:
  prefix: clouddriver
scheduler:
  interval_ms: 30000
  max_concurrency: 4
  overlap_policy: skip
cluster:
  lock_ttl_ms: 60000
  heartbeat_interval_ms: 10000
store:
  backend: sqlite
  database_path: /var/lib/fleetcache/cache.db
  max_connections: 5
  busy_timeout_ms: 2000
logging:
  level: debug
  format: pretty
  log_dir: /var/log/fleetcache
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.cache.prefix, "clouddriver");
        assert_eq!(config.scheduler.interval_ms, 30_000);
        assert_eq!(config.scheduler.max_concurrency, 4);
        assert_eq!(config.scheduler.overlap_policy, OverlapPolicy::Skip);
        assert_eq!(config.cluster.effective_heartbeat_interval_ms(), 10_000);
        assert_eq!(config.cluster.lock_prefix, "agent-lock:");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.store.busy_timeout_ms, 2_000);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(
            config.logging.log_dir.as_deref(),
            Some(std::path::Path::new("/var/log/fleetcache"))
        );
        assert_eq!(config.logging.retention_days, 30);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_cache_prefix() {
        let mut config = Config::default();
        config.cache.prefix = "a:b".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCachePrefix(_))
        ));

        config.cache.prefix = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCachePrefix(_))
        ));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.scheduler.interval_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidInterval(0))
        ));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.scheduler.max_concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrency(0))
        ));
    }

    #[test]
    fn test_validate_heartbeat_must_be_shorter_than_ttl() {
        let mut config = Config::default();
        config.cluster.lock_ttl_ms = 1000;
        config.cluster.heartbeat_interval_ms = Some(1000);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidHeartbeat(1000, 1000))
        ));

        config.cluster.heartbeat_interval_ms = Some(0);
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = Config::default();
        config.cluster.lock_ttl_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLockTtl(0))
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_store() {
        let mut config = Config::default();
        config.store.database_path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));

        let mut config = Config::default();
        config.store.max_connections = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  prefix: from-file\ncluster:\n  lock_ttl_ms: 9000").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.cache.prefix, "from-file");
        assert_eq!(config.cluster.effective_heartbeat_interval_ms(), 3000);
        assert_eq!(config.scheduler.interval_ms, 60_000);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  interval_ms: 0").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("FLEETCACHE_CACHE__PREFIX", Some("from-env")),
                ("FLEETCACHE_SCHEDULER__OVERLAP_POLICY", Some("skip")),
                ("FLEETCACHE_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load().unwrap();
                assert_eq!(config.cache.prefix, "from-env");
                assert_eq!(config.scheduler.overlap_policy, OverlapPolicy::Skip);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "cache:\n  prefix: base\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "cache:\n  prefix: override\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.cache.prefix, "override", "Override should win");
        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(config.logging.format, "json", "Base value should persist when not overridden");
    }
}
