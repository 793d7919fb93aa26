//! Usage counters shared by the transport and evaluator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Lock-free usage counters
#[derive(Debug)]
pub struct MetricsCollector {
    api_calls: AtomicU64,
    api_errors: AtomicU64,
    total_latency_micros: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    flags_evaluated: AtomicU64,
    gates_evaluated: AtomicU64,
    events_tracked: AtomicU64,
    started: Mutex<(Instant, DateTime<Utc>)>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls: u64,
    pub error_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub flags_evaluated: u64,
    pub gates_evaluated: u64,
    pub events_tracked: u64,
    /// Sum of all request latencies
    #[serde(with = "duration_millis")]
    pub total_latency: Duration,
    /// Mean request latency; zero before the first call
    #[serde(with = "duration_millis")]
    pub average_latency: Duration,
    /// Failed calls as a percentage of all calls
    pub error_rate: f64,
    /// Cache hits as a percentage of all lookups
    pub cache_hit_rate: f64,
    pub started_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            api_calls: AtomicU64::new(0),
            api_errors: AtomicU64::new(0),
            total_latency_micros: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            flags_evaluated: AtomicU64::new(0),
            gates_evaluated: AtomicU64::new(0),
            events_tracked: AtomicU64::new(0),
            started: Mutex::new((Instant::now(), Utc::now())),
        }
    }

    /// Record one request attempt.
    pub fn record_api_call(&self, latency: Duration, success: bool) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
        if !success {
            self.api_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag_evaluation(&self) {
        self.flags_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gate_evaluation(&self) {
        self.gates_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `count` events handed to the service.
    pub fn record_events_tracked(&self, count: u64) {
        self.events_tracked.fetch_add(count, Ordering::Relaxed);
    }

    /// Time since creation or the last reset
    pub fn uptime(&self) -> Duration {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .elapsed()
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        for counter in [
            &self.api_calls,
            &self.api_errors,
            &self.total_latency_micros,
            &self.cache_hits,
            &self.cache_misses,
            &self.flags_evaluated,
            &self.gates_evaluated,
            &self.events_tracked,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = (Instant::now(), Utc::now());
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let error_count = self.api_errors.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total_latency =
            Duration::from_micros(self.total_latency_micros.load(Ordering::Relaxed));

        let average_latency = if api_calls == 0 {
            Duration::ZERO
        } else {
            total_latency / u32::try_from(api_calls).unwrap_or(u32::MAX)
        };
        let percent = |part: u64, whole: u64| {
            if whole == 0 {
                0.0
            } else {
                part as f64 / whole as f64 * 100.0
            }
        };
        let started_at = self.started.lock().unwrap_or_else(PoisonError::into_inner).1;

        MetricsSnapshot {
            api_calls,
            error_count,
            cache_hits,
            cache_misses,
            flags_evaluated: self.flags_evaluated.load(Ordering::Relaxed),
            gates_evaluated: self.gates_evaluated.load(Ordering::Relaxed),
            events_tracked: self.events_tracked.load(Ordering::Relaxed),
            total_latency,
            average_latency,
            error_rate: percent(error_count, api_calls),
            cache_hit_rate: percent(cache_hits, cache_hits + cache_misses),
            started_at,
            captured_at: Utc::now(),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.api_calls, 0);
        assert_eq!(snapshot.average_latency, Duration::ZERO);
        assert!(snapshot.error_rate.abs() < f64::EPSILON);
        assert!(snapshot.cache_hit_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_rates_and_latency() {
        let metrics = MetricsCollector::new();
        metrics.record_api_call(Duration::from_millis(10), true);
        metrics.record_api_call(Duration::from_millis(30), false);
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_calls, 2);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.total_latency, Duration::from_millis(40));
        assert_eq!(snapshot.average_latency, Duration::from_millis(20));
        assert!((snapshot.error_rate - 50.0).abs() < 1e-9);
        assert!((snapshot.cache_hit_rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let metrics = MetricsCollector::new();
        metrics.record_flag_evaluation();
        metrics.record_gate_evaluation();
        metrics.record_events_tracked(3);
        metrics.record_api_call(Duration::from_millis(5), true);
        assert_eq!(metrics.snapshot().events_tracked, 3);

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flags_evaluated, 0);
        assert_eq!(snapshot.gates_evaluated, 0);
        assert_eq!(snapshot.events_tracked, 0);
        assert_eq!(snapshot.api_calls, 0);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_flag_evaluation();
                        metrics.record_cache_miss();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flags_evaluated, 4000);
        assert_eq!(snapshot.cache_misses, 4000);
    }

    #[test]
    fn test_snapshot_serializes_latency_as_millis() {
        let metrics = MetricsCollector::new();
        metrics.record_api_call(Duration::from_millis(12), true);
        let value = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(value["total_latency"], 12);
        assert_eq!(value["average_latency"], 12);
    }
}
