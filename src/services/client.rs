//! Public client facade: wiring, typed accessors and shutdown.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::{SdkError, SdkResult};
use crate::domain::models::{Config, EvaluationResult, Event, UserContext};
use crate::domain::ports::FlagApi;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::transport::{HttpFlagApi, ResilientTransport};
use crate::services::cache_coordinator::{CacheCoordinator, CacheStats};
use crate::services::evaluator::Evaluator;
use crate::services::metrics::{MetricsCollector, MetricsSnapshot};

/// Feature flag client
///
/// Owns the cache, the transport and the background expiry sweep. Must be
/// created inside a tokio runtime. Call [`FlagClient::close`] to stop the
/// sweep and flush a persistent cache; dropping the client stops the sweep
/// without flushing.
pub struct FlagClient {
    config: Config,
    api: Arc<dyn FlagApi>,
    evaluator: Evaluator,
    metrics: Arc<MetricsCollector>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl FlagClient {
    /// Validate `config` and build a client talking to the configured service.
    pub fn new(config: Config) -> SdkResult<Self> {
        ConfigLoader::validate(&config)?;
        let metrics = Arc::new(MetricsCollector::new());
        let transport = ResilientTransport::new(&config, Arc::clone(&metrics))?;
        let api = Arc::new(HttpFlagApi::new(transport, config.environment.clone()));
        Self::assemble(config, api, metrics)
    }

    /// Build a client over a caller-supplied flag service.
    pub fn with_api(config: Config, api: Arc<dyn FlagApi>) -> SdkResult<Self> {
        ConfigLoader::validate(&config)?;
        Self::assemble(config, api, Arc::new(MetricsCollector::new()))
    }

    fn assemble(
        config: Config,
        api: Arc<dyn FlagApi>,
        metrics: Arc<MetricsCollector>,
    ) -> SdkResult<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SdkError::config(
                "FlagClient must be created inside a tokio runtime",
                None,
            ));
        }

        let cache = Arc::new(CacheCoordinator::from_config(&config.cache));
        let shutdown = CancellationToken::new();
        let sweeper = Arc::clone(&cache).spawn_sweeper(shutdown.child_token());
        let evaluator = Evaluator::new(
            Arc::clone(&api),
            cache,
            Arc::clone(&metrics),
            config.environment.clone(),
        );

        info!(
            base_url = %config.base_url,
            environment = %config.environment,
            api_key = %config.redacted_api_key(),
            persistent_cache = config.cache.enable_persistence,
            "flag client started"
        );

        Ok(Self {
            config,
            api,
            evaluator,
            metrics,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
            closed: AtomicBool::new(false),
        })
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Full evaluation result for one flag.
    pub async fn evaluate_flag(&self, key: &str, default: Value, user: &UserContext) -> EvaluationResult {
        self.evaluate_flag_with_cancel(key, default, user, &CancellationToken::new())
            .await
    }

    /// Like [`FlagClient::evaluate_flag`], abandoned as soon as `cancel` fires.
    pub async fn evaluate_flag_with_cancel(
        &self,
        key: &str,
        default: Value,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        if self.is_closed() {
            return EvaluationResult::error_fallback(key, default, &closed_error());
        }
        let call = self.shutdown.child_token();
        until_cancelled(cancel, &call, self.evaluator.evaluate_flag(key, default, user, &call)).await
    }

    /// Full results for several flags, each paired with its default.
    pub async fn evaluate_flags(
        &self,
        requests: &[(String, Value)],
        user: &UserContext,
    ) -> HashMap<String, EvaluationResult> {
        self.evaluate_flags_with_cancel(requests, user, &CancellationToken::new())
            .await
    }

    /// Like [`FlagClient::evaluate_flags`]; once `cancel` fires, uncached
    /// keys fall back to their defaults.
    pub async fn evaluate_flags_with_cancel(
        &self,
        requests: &[(String, Value)],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> HashMap<String, EvaluationResult> {
        if self.is_closed() {
            let err = closed_error();
            return requests
                .iter()
                .map(|(key, default)| {
                    (key.clone(), EvaluationResult::error_fallback(key.as_str(), default.clone(), &err))
                })
                .collect();
        }
        let call = self.shutdown.child_token();
        until_cancelled(cancel, &call, self.evaluator.evaluate_flags(requests, user, &call)).await
    }

    pub async fn bool_flag(&self, key: &str, default: bool, user: &UserContext) -> bool {
        let result = self.evaluate_flag(key, Value::Bool(default), user).await;
        typed(&result, Value::as_bool).unwrap_or(default)
    }

    pub async fn string_flag(&self, key: &str, default: &str, user: &UserContext) -> String {
        let result = self.evaluate_flag(key, Value::from(default), user).await;
        typed(&result, |v| v.as_str().map(str::to_owned)).unwrap_or_else(|| default.to_owned())
    }

    /// Integer flag; float values are truncated toward zero.
    pub async fn int_flag(&self, key: &str, default: i64, user: &UserContext) -> i64 {
        let result = self.evaluate_flag(key, Value::from(default), user).await;
        typed(&result, as_integer).unwrap_or(default)
    }

    pub async fn float_flag(&self, key: &str, default: f64, user: &UserContext) -> f64 {
        let result = self.evaluate_flag(key, Value::from(default), user).await;
        typed(&result, Value::as_f64).unwrap_or(default)
    }

    pub async fn json_flag(&self, key: &str, default: Value, user: &UserContext) -> Value {
        self.evaluate_flag(key, default, user).await.value
    }

    /// Full evaluation result for one gate.
    pub async fn evaluate_gate(&self, key: &str, user: &UserContext) -> EvaluationResult {
        self.evaluate_gate_with_cancel(key, user, &CancellationToken::new())
            .await
    }

    /// Like [`FlagClient::evaluate_gate`], abandoned as soon as `cancel` fires.
    pub async fn evaluate_gate_with_cancel(
        &self,
        key: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        if self.is_closed() {
            return EvaluationResult::error_fallback(key, Value::Bool(false), &closed_error());
        }
        let call = self.shutdown.child_token();
        until_cancelled(cancel, &call, self.evaluator.evaluate_gate(key, user, &call)).await
    }

    /// Whether `user` may pass the gate; denied on any error.
    pub async fn gate(&self, key: &str, user: &UserContext) -> bool {
        let result = self.evaluate_gate(key, user).await;
        typed(&result, Value::as_bool).unwrap_or(false)
    }

    /// Gate decisions for several keys.
    pub async fn gates(&self, keys: &[String], user: &UserContext) -> HashMap<String, bool> {
        self.gates_with_cancel(keys, user, &CancellationToken::new())
            .await
    }

    /// Like [`FlagClient::gates`]; once `cancel` fires, uncached gates are denied.
    pub async fn gates_with_cancel(
        &self,
        keys: &[String],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> HashMap<String, bool> {
        if self.is_closed() {
            return keys.iter().map(|key| (key.clone(), false)).collect();
        }
        let call = self.shutdown.child_token();
        until_cancelled(cancel, &call, self.evaluator.evaluate_gates(keys, user, &call))
            .await
            .into_iter()
            .map(|(key, result)| {
                let allowed = typed(&result, Value::as_bool).unwrap_or(false);
                (key, allowed)
            })
            .collect()
    }

    /// Report an analytics event. A missing timestamp is set to now.
    ///
    /// Does nothing when analytics are disabled.
    pub async fn track(&self, event: Event) -> SdkResult<()> {
        self.track_with_cancel(event, &CancellationToken::new()).await
    }

    pub async fn track_with_cancel(&self, mut event: Event, cancel: &CancellationToken) -> SdkResult<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        if !self.config.enable_analytics {
            debug!(event = %event.name, "analytics disabled, skipping event");
            return Ok(());
        }

        event.stamp(Utc::now());
        self.metrics.record_events_tracked(1);

        let call = self.shutdown.child_token();
        let outcome = until_cancelled(cancel, &call, self.api.track_event(&event, &call)).await;
        match &outcome {
            Ok(()) => debug!(event = %event.name, user_id = %event.user_id, "event tracked"),
            Err(e) => warn!(event = %event.name, error = %e, code = e.code(), "failed to track event"),
        }
        outcome
    }

    /// Report several analytics events in one request.
    pub async fn track_batch(&self, events: Vec<Event>) -> SdkResult<()> {
        self.track_batch_with_cancel(events, &CancellationToken::new())
            .await
    }

    pub async fn track_batch_with_cancel(
        &self,
        mut events: Vec<Event>,
        cancel: &CancellationToken,
    ) -> SdkResult<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        if !self.config.enable_analytics {
            debug!(count = events.len(), "analytics disabled, skipping events");
            return Ok(());
        }
        if events.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        for event in &mut events {
            event.stamp(now);
        }
        self.metrics
            .record_events_tracked(u64::try_from(events.len()).unwrap_or(u64::MAX));

        let call = self.shutdown.child_token();
        let outcome = until_cancelled(cancel, &call, self.api.track_events(&events, &call)).await;
        match &outcome {
            Ok(()) => debug!(count = events.len(), "events tracked"),
            Err(e) => warn!(count = events.len(), error = %e, code = e.code(), "failed to track events"),
        }
        outcome
    }

    /// Discard cached evaluations so the next calls hit the service.
    pub fn refresh_cache(&self) {
        self.evaluator.refresh_cache();
    }

    pub fn clear_cache(&self) {
        self.evaluator.cache().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.evaluator.cache().stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop background work, abort in-flight calls and flush the cache.
    ///
    /// Idempotent; later evaluations return their defaults.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!(error = %e, "cache sweeper ended abnormally");
            }
        }

        if let Err(e) = self.evaluator.cache().flush() {
            warn!(error = %e, "failed to flush cache on close");
        }
        info!("flag client closed");
    }
}

impl Drop for FlagClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for FlagClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagClient")
            .field("base_url", &self.config.base_url)
            .field("environment", &self.config.environment)
            .field("api_key", &self.config.redacted_api_key())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Run `work` under the per-call token `call`, cancelling `call` when the
/// caller's `cancel` fires. `work` must observe `call`; it then finishes
/// promptly with its own cancellation outcome.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    call: &CancellationToken,
    work: impl Future<Output = T>,
) -> T {
    tokio::pin!(work);
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            call.cancel();
            work.await
        }
        result = &mut work => result,
    }
}

fn closed_error() -> SdkError {
    SdkError::config("client is closed", None)
}

/// Typed view of a result's value, `None` on error or type mismatch.
fn typed<T>(result: &EvaluationResult, extract: impl Fn(&Value) -> Option<T>) -> Option<T> {
    if let Some(error) = &result.error {
        debug!(key = %result.key, kind = ?error.kind, "returning default after failed evaluation");
        return None;
    }
    let value = extract(&result.value);
    if value.is_none() {
        warn!(key = %result.key, value = %result.value, "flag value has unexpected type, using default");
    }
    value
}

#[allow(clippy::cast_possible_truncation)]
fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}
