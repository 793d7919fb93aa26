use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::domain::errors::SdkError;
use crate::domain::models::Config;

/// Project-local configuration file, created by the operator
pub const PROJECT_CONFIG_PATH: &str = ".flagcache/config.yaml";

/// Optional local overrides, usually git-ignored
pub const LOCAL_CONFIG_PATH: &str = ".flagcache/local.yaml";

/// Prefix for environment overrides; nested keys use `__`
pub const ENV_PREFIX: &str = "FLAGCACHE_";

/// Eviction policy names accepted in configuration
const EVICTION_POLICIES: [&str; 3] = ["lru", "lfu", "ttl"];

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("Base URL cannot be empty")]
    EmptyBaseUrl,

    #[error("Environment cannot be empty")]
    EmptyEnvironment,

    #[error("Invalid timeout_ms: 0. Must be positive")]
    ZeroTimeout,

    #[error("Invalid cache.max_size: 0. Must be at least 1")]
    ZeroCacheSize,

    #[error("Invalid cache TTL: {0}. Must be positive")]
    ZeroTtl(&'static str),

    #[error("Invalid cache.sweep_interval_secs: 0. Must be positive")]
    ZeroSweepInterval,

    #[error("Invalid initial_backoff_ms: 0. Must be positive")]
    ZeroBackoff,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid jitter: {0}. Must be in [0, 1)")]
    InvalidJitter(String),

    #[error("cache.persistence_path is required when persistence is enabled")]
    MissingPersistencePath,

    #[error("Invalid eviction policy: {0}. Must be one of: lru, lfu, ttl")]
    InvalidEvictionPolicy(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

impl ConfigError {
    /// Configuration field the error refers to
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "api_key",
            Self::EmptyBaseUrl => "base_url",
            Self::EmptyEnvironment => "environment",
            Self::ZeroTimeout => "timeout_ms",
            Self::ZeroCacheSize => "cache.max_size",
            Self::ZeroTtl(field) => field,
            Self::ZeroSweepInterval => "cache.sweep_interval_secs",
            Self::ZeroBackoff | Self::InvalidBackoff(..) => "retry.initial_backoff_ms",
            Self::InvalidJitter(_) => "retry.jitter",
            Self::MissingPersistencePath => "cache.persistence_path",
            Self::InvalidEvictionPolicy(_) => "cache.eviction_policy",
            Self::InvalidLogLevel(_) => "logging.level",
            Self::InvalidLogFormat(_) => "logging.format",
            Self::InvalidLogRotation(_) => "logging.rotation",
        }
    }
}

impl From<ConfigError> for SdkError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string(), Some(err.field()))
    }
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .flagcache/config.yaml (project config)
    /// 3. .flagcache/local.yaml (local overrides, optional)
    /// 4. Environment variables (`FLAGCACHE_*`, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(PROJECT_CONFIG_PATH))
            .merge(Yaml::file(LOCAL_CONFIG_PATH))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if config.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if config.environment.trim().is_empty() {
            return Err(ConfigError::EmptyEnvironment);
        }
        if config.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        // Cache
        let cache = &config.cache;
        if cache.max_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        if cache.ttl_secs == 0 {
            return Err(ConfigError::ZeroTtl("cache.ttl_secs"));
        }
        if cache.gate_ttl_secs == Some(0) {
            return Err(ConfigError::ZeroTtl("cache.gate_ttl_secs"));
        }
        if cache.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if cache.enable_persistence && cache.persistence_path.is_none() {
            return Err(ConfigError::MissingPersistencePath);
        }
        let policy = cache.eviction_policy.to_lowercase();
        if !EVICTION_POLICIES.contains(&policy.as_str()) {
            return Err(ConfigError::InvalidEvictionPolicy(
                cache.eviction_policy.clone(),
            ));
        }
        if policy != "lru" {
            warn!(
                policy = %cache.eviction_policy,
                "only LRU eviction is implemented, falling back to lru"
            );
        }

        // Retry
        let retry = &config.retry;
        if retry.initial_backoff_ms == 0 {
            return Err(ConfigError::ZeroBackoff);
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }
        if !(0.0..1.0).contains(&retry.jitter) {
            return Err(ConfigError::InvalidJitter(retry.jitter.to_string()));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
