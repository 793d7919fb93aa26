//! Cache-aside evaluation of flags and gates.
//!
//! Each call looks the key up in the cache, falls through to the flag
//! service on a miss and stores successful answers. Failures turn into the
//! caller's default and are never cached, so the next call retries the
//! network instead of pinning a fallback for a whole TTL window.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::domain::models::{CacheKey, EvaluationResult, Namespace, UserContext};
use crate::domain::ports::FlagApi;
use crate::services::cache_coordinator::CacheCoordinator;
use crate::services::metrics::MetricsCollector;

/// Cache-aside evaluator shared by all client calls
pub struct Evaluator {
    api: Arc<dyn FlagApi>,
    cache: Arc<CacheCoordinator>,
    metrics: Arc<MetricsCollector>,
    environment: String,
}

impl Evaluator {
    pub fn new(
        api: Arc<dyn FlagApi>,
        cache: Arc<CacheCoordinator>,
        metrics: Arc<MetricsCollector>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            api,
            cache,
            metrics,
            environment: environment.into(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        &self.cache
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Evaluate one flag, returning `default` if the service cannot answer.
    #[instrument(skip(self, default, user, cancel), fields(user_id = %user.user_id))]
    pub async fn evaluate_flag(
        &self,
        flag_key: &str,
        default: Value,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        self.metrics.record_flag_evaluation();
        let key = CacheKey::flag(flag_key, &user.user_id, &self.environment);

        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        match self.api.evaluate_flag(flag_key, user, cancel).await {
            Ok(remote) => {
                let result = EvaluationResult::from_remote_or_fallback(flag_key, remote, default);
                self.store(&key, Namespace::Flag, &result);
                result
            }
            Err(err) => {
                warn!(flag_key, error = %err, code = err.code(), "flag evaluation failed, using default");
                EvaluationResult::error_fallback(flag_key, default, &err)
            }
        }
    }

    /// Evaluate several flags with at most one request for the uncached ones.
    ///
    /// `requests` pairs each key with its default. Duplicate keys are
    /// evaluated once, keeping the first default.
    #[instrument(skip(self, requests, user, cancel), fields(user_id = %user.user_id, count = requests.len()))]
    pub async fn evaluate_flags(
        &self,
        requests: &[(String, Value)],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> HashMap<String, EvaluationResult> {
        let requests = dedupe(requests);
        for _ in &requests {
            self.metrics.record_flag_evaluation();
        }
        self.evaluate_batch(Namespace::Flag, requests, user, cancel).await
    }

    /// Evaluate one gate; gates default to closed.
    #[instrument(skip(self, user, cancel), fields(user_id = %user.user_id))]
    pub async fn evaluate_gate(
        &self,
        gate_key: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        self.metrics.record_gate_evaluation();
        let key = CacheKey::gate(gate_key, &user.user_id, &self.environment);

        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        match self.api.evaluate_gate(gate_key, user, cancel).await {
            Ok(remote) => {
                let result =
                    EvaluationResult::from_remote_or_fallback(gate_key, remote, Value::Bool(false));
                self.store(&key, Namespace::Gate, &result);
                result
            }
            Err(err) => {
                warn!(gate_key, error = %err, code = err.code(), "gate evaluation failed, denying");
                EvaluationResult::error_fallback(gate_key, Value::Bool(false), &err)
            }
        }
    }

    /// Evaluate several gates with at most one request for the uncached ones.
    #[instrument(skip(self, gate_keys, user, cancel), fields(user_id = %user.user_id, count = gate_keys.len()))]
    pub async fn evaluate_gates(
        &self,
        gate_keys: &[String],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> HashMap<String, EvaluationResult> {
        let requests: Vec<(String, Value)> = gate_keys
            .iter()
            .map(|key| (key.clone(), Value::Bool(false)))
            .collect();
        let requests = dedupe(&requests);
        for _ in &requests {
            self.metrics.record_gate_evaluation();
        }
        self.evaluate_batch(Namespace::Gate, requests, user, cancel).await
    }

    /// Drop every cached evaluation so the next lookups go to the service.
    pub fn refresh_cache(&self) {
        debug!(entries = self.cache.size(), "refreshing evaluation cache");
        self.cache.clear();
    }

    async fn evaluate_batch(
        &self,
        namespace: Namespace,
        requests: Vec<(String, Value)>,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> HashMap<String, EvaluationResult> {
        let mut results = HashMap::with_capacity(requests.len());
        let mut misses: Vec<(String, Value, CacheKey)> = Vec::new();

        for (entity_key, default) in requests {
            let key = CacheKey::derive(namespace, &entity_key, &user.user_id, &self.environment);
            match self.lookup(&key) {
                Some(hit) => {
                    results.insert(entity_key, hit);
                }
                None => misses.push((entity_key, default, key)),
            }
        }

        if misses.is_empty() {
            debug!(namespace = %namespace, hits = results.len(), "batch served from cache");
            return results;
        }

        let miss_keys: Vec<String> = misses.iter().map(|(k, _, _)| k.clone()).collect();
        let fetched = match namespace {
            Namespace::Flag => self.api.evaluate_flags(&miss_keys, user, cancel).await,
            Namespace::Gate => self.api.evaluate_gates(&miss_keys, user, cancel).await,
        };

        match fetched {
            Ok(mut remote) => {
                for (entity_key, default, key) in misses {
                    let result = match remote.remove(&entity_key) {
                        Some(evaluation) => {
                            let result = EvaluationResult::from_remote_or_fallback(
                                entity_key.as_str(),
                                evaluation,
                                default,
                            );
                            self.store(&key, namespace, &result);
                            result
                        }
                        None => {
                            debug!(key = %entity_key, "service returned no entry for key");
                            EvaluationResult::not_found(entity_key.as_str(), default)
                        }
                    };
                    results.insert(entity_key, result);
                }
            }
            Err(err) => {
                warn!(
                    namespace = %namespace,
                    misses = misses.len(),
                    error = %err,
                    code = err.code(),
                    "batch evaluation failed, using defaults"
                );
                for (entity_key, default, _) in misses {
                    let result = EvaluationResult::error_fallback(entity_key.as_str(), default, &err);
                    results.insert(entity_key, result);
                }
            }
        }

        results
    }

    fn lookup(&self, key: &CacheKey) -> Option<EvaluationResult> {
        if let Some(cached) = self.cache.get(key) {
            self.metrics.record_cache_hit();
            debug!(cache_key = %key, "cache hit");
            Some(cached.into_cache_hit())
        } else {
            self.metrics.record_cache_miss();
            debug!(cache_key = %key, "cache miss");
            None
        }
    }

    fn store(&self, key: &CacheKey, namespace: Namespace, result: &EvaluationResult) {
        if result.is_success() {
            self.cache.set(key, result.clone(), self.cache.ttl_for(namespace));
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("environment", &self.environment)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn dedupe(requests: &[(String, Value)]) -> Vec<(String, Value)> {
    let mut seen = HashSet::with_capacity(requests.len());
    requests
        .iter()
        .filter(|(key, _)| seen.insert(key.as_str()))
        .cloned()
        .collect()
}
