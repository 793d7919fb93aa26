//! In-memory evaluation cache with LRU eviction and per-entry TTL.
//!
//! Entries live in an `IndexMap` ordered by recency: index 0 is the least
//! recently used entry, the last index the most recently used. A single
//! mutex guards both the map and its order, so touches and evictions are
//! always serialized.
//!
//! Reads never restructure the map for expired entries. A `get` that finds
//! an expired entry reports a miss and queues the key; the next mutating call
//! drains the queue and removes each key only if it is still expired, so a
//! value refreshed in between survives.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

use crate::domain::models::EvaluationResult;
use crate::domain::ports::CacheStore;

/// A cached value with its absolute expiry
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// Cache key
    pub key: String,
    /// Cached result
    pub value: EvaluationResult,
    /// Instant from which the entry is treated as absent
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    value: EvaluationResult,
    expires_at: DateTime<Utc>,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug)]
struct Inner {
    entries: IndexMap<String, Slot>,
    pending_removal: Vec<String>,
    capacity: usize,
}

impl Inner {
    fn drain_pending(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for key in std::mem::take(&mut self.pending_removal) {
            let still_expired = self
                .entries
                .get(&key)
                .is_some_and(|slot| slot.is_expired(now));
            if still_expired {
                self.entries.shift_remove(&key);
                removed += 1;
            }
        }
        removed
    }

    fn evict_overflow(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if let Some((key, _)) = self.entries.shift_remove_index(0) {
                trace!(key = %key, "evicted least recently used entry");
                evicted += 1;
            }
        }
        evicted
    }

    fn insert(&mut self, key: &str, slot: Slot, now: DateTime<Utc>) {
        self.drain_pending(now);
        // Re-inserting after removal moves the key to the most recent position.
        self.entries.shift_remove(key);
        self.entries.insert(key.to_string(), slot);
        let evicted = self.evict_overflow();
        if evicted > 0 {
            debug!(evicted, capacity = self.capacity, "cache over capacity");
        }
    }
}

/// Thread-safe LRU cache of evaluation results with per-entry TTL
#[derive(Debug)]
pub struct BoundedCache {
    inner: Mutex<Inner>,
    default_ttl: Duration,
}

impl BoundedCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::with_capacity(capacity.min(4096)),
                pending_removal: Vec::new(),
                capacity: capacity.max(1),
            }),
            default_ttl,
        }
    }

    // The map and order are updated together in every critical section, so a
    // panic elsewhere cannot leave them inconsistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Change the capacity, evicting least recently used entries on shrink.
    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.lock();
        inner.capacity = capacity.max(1);
        let evicted = inner.evict_overflow();
        debug!(capacity = inner.capacity, evicted, "cache capacity changed");
    }

    /// TTL applied when `set` is called with a zero TTL
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Insert with an absolute expiry, as when restoring a snapshot.
    pub fn set_with_expiry(&self, key: &str, value: EvaluationResult, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        self.lock().insert(key, Slot { value, expires_at }, now);
    }

    /// Point-in-time copy of all unexpired entries, least recently used first.
    pub fn entries(&self) -> Vec<StoredEntry> {
        let now = Utc::now();
        self.lock()
            .entries
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, slot)| StoredEntry {
                key: key.clone(),
                value: slot.value.clone(),
                expires_at: slot.expires_at,
            })
            .collect()
    }

    fn expiry_for(&self, now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl CacheStore for BoundedCache {
    fn get(&self, key: &str) -> Option<EvaluationResult> {
        let now = Utc::now();
        let mut inner = self.lock();

        let idx = inner.entries.get_index_of(key)?;
        if inner.entries[idx].is_expired(now) {
            if !inner.pending_removal.iter().any(|pending| pending == key) {
                inner.pending_removal.push(key.to_string());
            }
            trace!(key = %key, "cache entry expired");
            return None;
        }

        let value = inner.entries[idx].value.clone();
        let last = inner.entries.len() - 1;
        inner.entries.move_index(idx, last);
        Some(value)
    }

    fn set(&self, key: &str, value: EvaluationResult, ttl: Duration) {
        let now = Utc::now();
        let expires_at = self.expiry_for(now, ttl);
        self.lock().insert(key, Slot { value, expires_at }, now);
    }

    fn delete(&self, key: &str) -> bool {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.drain_pending(now);
        inner.entries.shift_remove(key).is_some()
    }

    fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.pending_removal.clear();
    }

    fn size(&self) -> usize {
        self.lock().entries.len()
    }

    fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        self.lock()
            .entries
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.drain_pending(now);
        let before = inner.entries.len();
        inner.entries.retain(|_, slot| !slot.is_expired(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "swept expired cache entries");
        }
        removed
    }
}
