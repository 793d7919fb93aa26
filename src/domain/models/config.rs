use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a flagcache client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// API key sent with every request
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the flag service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment name used for evaluation and cache keys
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Per-attempt HTTP timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Send tracked events to the service; when false tracking is a no-op
    #[serde(default = "default_enable_analytics")]
    pub enable_analytics: bool,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Evaluation cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

const fn default_timeout_ms() -> u64 {
    5000
}

const fn default_enable_analytics() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            environment: default_environment(),
            timeout_ms: default_timeout_ms(),
            enable_analytics: default_enable_analytics(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Per-attempt request timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// API key safe for display: first 4 characters followed by a marker.
    pub fn redacted_api_key(&self) -> String {
        redact_key(&self.api_key)
    }
}

/// Redacts a secret to its first 4 characters.
pub fn redact_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}...[REDACTED]")
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Jitter fraction applied to each backoff, in `[0, 1)`
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_jitter() -> f64 {
    0.25
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Evaluation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Flag result TTL in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Gate result TTL in seconds, falls back to `ttl_secs`
    #[serde(default)]
    pub gate_ttl_secs: Option<u64>,

    /// Maximum number of cached results
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Snapshot the cache to disk
    #[serde(default)]
    pub enable_persistence: bool,

    /// Snapshot file, required when persistence is enabled
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,

    /// Eviction policy name: lru, lfu or ttl
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,

    /// Expiry sweep interval in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_ttl_secs() -> u64 {
    300
}

const fn default_max_size() -> usize {
    1000
}

fn default_eviction_policy() -> String {
    "lru".to_string()
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            gate_ttl_secs: None,
            max_size: default_max_size(),
            enable_persistence: false,
            persistence_path: None,
            eviction_policy: default_eviction_policy(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Flag result TTL
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Gate result TTL
    pub fn gate_ttl(&self) -> Duration {
        Duration::from_secs(self.gate_ttl_secs.unwrap_or(self.ttl_secs))
    }

    /// Expiry sweep interval
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
