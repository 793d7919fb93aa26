//! Backend selection and periodic expiry sweeps for the evaluation cache.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::cache::{BoundedCache, DurableCacheStore};
use crate::domain::errors::SdkResult;
use crate::domain::models::{CacheConfig, CacheKey, EvaluationResult, Namespace};
use crate::domain::ports::CacheStore;

/// Cache size and policy, as reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    #[serde(serialize_with = "as_secs")]
    pub ttl: Duration,
    #[serde(serialize_with = "as_secs")]
    pub gate_ttl: Duration,
    pub persistent: bool,
}

/// Shortest sweep period; `tokio::time::interval` rejects zero
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

fn as_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Facade over the configured [`CacheStore`]
///
/// Resolves zero TTLs to the namespace default and owns the background
/// sweep that removes expired entries between reads.
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    gate_ttl: Duration,
    max_size: usize,
    sweep_interval: Duration,
}

impl CacheCoordinator {
    /// Build the backend the configuration asks for.
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.eviction_policy.eq_ignore_ascii_case("lru") {
            debug!(policy = %config.eviction_policy, "using lru eviction");
        }

        let store: Arc<dyn CacheStore> = match (&config.persistence_path, config.enable_persistence) {
            (Some(path), true) => {
                info!(path = %path.display(), "cache persistence enabled");
                Arc::new(DurableCacheStore::new(config.max_size, config.ttl(), path))
            }
            (None, true) => {
                warn!("cache persistence enabled without a path, using memory only");
                Arc::new(BoundedCache::new(config.max_size, config.ttl()))
            }
            (_, false) => Arc::new(BoundedCache::new(config.max_size, config.ttl())),
        };

        Self::with_store(store, config)
    }

    /// Use a caller-supplied backend.
    pub fn with_store(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            default_ttl: config.ttl(),
            gate_ttl: config.gate_ttl(),
            max_size: config.max_size,
            sweep_interval: config.sweep_interval(),
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub const fn gate_ttl(&self) -> Duration {
        self.gate_ttl
    }

    /// TTL applied to fresh results in `namespace`
    pub const fn ttl_for(&self, namespace: Namespace) -> Duration {
        match namespace {
            Namespace::Flag => self.default_ttl,
            Namespace::Gate => self.gate_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn get(&self, key: &CacheKey) -> Option<EvaluationResult> {
        self.store.get(key.as_str())
    }

    /// Store `value`; a zero `ttl` means the default TTL.
    pub fn set(&self, key: &CacheKey, value: EvaluationResult, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        self.store.set(key.as_str(), value, ttl);
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        self.store.delete(key.as_str())
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn size(&self) -> usize {
        self.store.size()
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Remove expired entries now; the durable store re-persists if any were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.store.cleanup_expired()
    }

    pub fn flush(&self) -> SdkResult<()> {
        self.store.flush()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.store.size(),
            max_size: self.max_size,
            ttl: self.default_ttl,
            gate_ttl: self.gate_ttl,
            persistent: self.store.is_persistent(),
        }
    }

    /// Run the expiry sweep every sweep interval until `cancel` fires.
    ///
    /// The first sweep happens one full interval after spawning. The task
    /// exits as soon as the token is cancelled, without waiting for the
    /// next tick. An interval shorter than one millisecond is raised to one
    /// millisecond.
    pub fn spawn_sweeper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            debug!(
                interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
                "cache sweeper started"
            );

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.cleanup_expired();
                        if removed > 0 {
                            debug!(removed, remaining = self.size(), "cache sweep removed expired entries");
                        }
                    }
                }
            }

            debug!("cache sweeper stopped");
        })
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("size", &self.store.size())
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .field("gate_ttl", &self.gate_ttl)
            .field("persistent", &self.store.is_persistent())
            .finish_non_exhaustive()
    }
}
