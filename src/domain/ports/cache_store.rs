use std::time::Duration;

use crate::domain::errors::SdkResult;
use crate::domain::models::EvaluationResult;

/// Storage backend for cached evaluation results
///
/// Implementations are synchronous and internally locked: every method has a
/// bounded critical section and never blocks on I/O while holding the cache
/// lock. Returned values are owned copies.
pub trait CacheStore: Send + Sync {
    /// Fresh value for `key`, or `None` if absent or expired
    fn get(&self, key: &str) -> Option<EvaluationResult>;

    /// Insert or refresh `key`; a zero `ttl` means the store's default TTL
    fn set(&self, key: &str, value: EvaluationResult, ttl: Duration);

    /// Remove `key`, returning whether it was present
    fn delete(&self, key: &str) -> bool;

    /// Remove every entry
    fn clear(&self);

    /// Number of stored entries, including expired ones not yet swept
    fn size(&self) -> usize;

    /// Keys of all unexpired entries, least recently used first
    fn keys(&self) -> Vec<String>;

    /// Remove expired entries, returning how many were removed
    fn cleanup_expired(&self) -> usize;

    /// Whether the store survives restarts
    fn is_persistent(&self) -> bool {
        false
    }

    /// Write any buffered state to durable storage
    fn flush(&self) -> SdkResult<()> {
        Ok(())
    }
}
