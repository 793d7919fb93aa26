//! Write-through snapshot persistence on top of [`BoundedCache`].
//!
//! Every successful mutation republishes the full set of live entries as a
//! JSON snapshot. The snapshot is written to `<path>.tmp` and renamed over
//! `<path>`, so readers only ever see a complete file. Persistence is
//! best-effort: failures are logged and the in-memory cache stays
//! authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bounded::{BoundedCache, StoredEntry};
use crate::domain::errors::{SdkError, SdkResult};
use crate::domain::models::EvaluationResult;
use crate::domain::ports::CacheStore;

/// On-disk snapshot: `{ "items": { <key>: { "value": ..., "expiration": ... } } }`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Entries keyed by cache key
    #[serde(default)]
    pub items: BTreeMap<String, PersistedItem>,
}

/// One persisted entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedItem {
    /// Cached result
    pub value: EvaluationResult,
    /// Absolute expiry, RFC 3339
    pub expiration: DateTime<Utc>,
}

impl PersistedSnapshot {
    fn capture(entries: Vec<StoredEntry>) -> Self {
        let items = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    PersistedItem {
                        value: entry.value,
                        expiration: entry.expires_at,
                    },
                )
            })
            .collect();
        Self { items }
    }
}

struct Shared {
    cache: BoundedCache,
    path: PathBuf,
    persist_lock: Mutex<()>,
    write_queued: AtomicBool,
}

impl Shared {
    fn persist(&self) -> SdkResult<()> {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // State is captured after taking the lock, so a later write never
        // publishes an older state than an earlier one.
        self.write_queued.store(false, Ordering::SeqCst);
        let snapshot = PersistedSnapshot::capture(self.cache.entries());
        write_snapshot(&self.path, &snapshot)
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "failed to persist cache snapshot");
        }
    }
}

/// Cache that survives restarts by snapshotting itself to disk
pub struct DurableCacheStore {
    shared: Arc<Shared>,
}

impl DurableCacheStore {
    /// Open a store backed by the snapshot at `path`.
    ///
    /// An existing snapshot is loaded, dropping entries that have already
    /// expired. A missing, unreadable or corrupt snapshot starts the cache
    /// empty.
    pub fn new(capacity: usize, default_ttl: Duration, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = BoundedCache::new(capacity, default_ttl);
        let restored = restore(&path, &cache);
        if restored > 0 {
            info!(path = %path.display(), restored, "restored cache snapshot");
        }

        Self {
            shared: Arc::new(Shared {
                cache,
                path,
                persist_lock: Mutex::new(()),
                write_queued: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot location
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// The in-memory cache behind this store
    pub fn memory(&self) -> &BoundedCache {
        &self.shared.cache
    }

    /// Publish the current state.
    ///
    /// Inside a tokio runtime the write runs on the blocking pool so callers
    /// never wait on disk I/O; several mutations may coalesce into one
    /// snapshot. Outside a runtime the write happens inline.
    fn schedule_persist(&self) {
        if self.shared.write_queued.swap(true, Ordering::SeqCst) {
            // A queued write has not captured state yet and will include this change.
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                handle.spawn_blocking(move || shared.persist_logged());
            }
            Err(_) => self.shared.persist_logged(),
        }
    }
}

impl std::fmt::Debug for DurableCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCacheStore")
            .field("path", &self.shared.path)
            .field("size", &self.shared.cache.size())
            .finish_non_exhaustive()
    }
}

impl CacheStore for DurableCacheStore {
    fn get(&self, key: &str) -> Option<EvaluationResult> {
        self.shared.cache.get(key)
    }

    fn set(&self, key: &str, value: EvaluationResult, ttl: Duration) {
        self.shared.cache.set(key, value, ttl);
        self.schedule_persist();
    }

    fn delete(&self, key: &str) -> bool {
        let removed = self.shared.cache.delete(key);
        if removed {
            self.schedule_persist();
        }
        removed
    }

    fn clear(&self) {
        self.shared.cache.clear();
        self.schedule_persist();
    }

    fn size(&self) -> usize {
        self.shared.cache.size()
    }

    fn keys(&self) -> Vec<String> {
        self.shared.cache.keys()
    }

    fn cleanup_expired(&self) -> usize {
        let removed = self.shared.cache.cleanup_expired();
        if removed > 0 {
            self.schedule_persist();
        }
        removed
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn flush(&self) -> SdkResult<()> {
        self.shared.persist()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn cache_error(operation: &str, message: String) -> SdkError {
    SdkError::Cache {
        message,
        operation: operation.to_string(),
    }
}

fn write_snapshot(path: &Path, snapshot: &PersistedSnapshot) -> SdkResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            cache_error(
                "persist",
                format!("cannot create {}: {e}", parent.display()),
            )
        })?;
    }

    let data = serde_json::to_vec(snapshot)
        .map_err(|e| cache_error("persist", format!("cannot serialize snapshot: {e}")))?;

    let tmp = temp_path(path);
    fs::write(&tmp, data)
        .map_err(|e| cache_error("persist", format!("cannot write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        cache_error(
            "persist",
            format!("cannot rename {} to {}: {e}", tmp.display(), path.display()),
        )
    })?;

    debug!(path = %path.display(), entries = snapshot.items.len(), "persisted cache snapshot");
    Ok(())
}

fn read_snapshot(path: &Path) -> SdkResult<Option<PersistedSnapshot>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(cache_error(
                "load",
                format!("cannot read {}: {e}", path.display()),
            ))
        }
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| cache_error("load", format!("corrupt snapshot {}: {e}", path.display())))
}

/// Load unexpired entries into `cache`, soonest-expiring first so capacity
/// pressure keeps the longest-lived ones.
fn restore(path: &Path, cache: &BoundedCache) -> usize {
    let snapshot = match read_snapshot(path) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            debug!(path = %path.display(), "no cache snapshot found");
            return 0;
        }
        Err(e) => {
            warn!(error = %e, "ignoring unreadable cache snapshot");
            return 0;
        }
    };

    let now = Utc::now();
    let total = snapshot.items.len();
    let mut live: Vec<(String, PersistedItem)> = snapshot
        .items
        .into_iter()
        .filter(|(_, item)| item.expiration > now)
        .collect();
    live.sort_by_key(|(_, item)| item.expiration);

    let restored = live.len();
    for (key, item) in live {
        cache.set_with_expiry(&key, item.value, item.expiration);
    }
    if restored < total {
        debug!(dropped = total - restored, "dropped expired snapshot entries");
    }
    restored
}
