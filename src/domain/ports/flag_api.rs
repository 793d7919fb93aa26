use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::SdkResult;
use crate::domain::models::{Event, RemoteEvaluation, UserContext};

/// Remote flag service: evaluation and event tracking
///
/// Every call observes `cancel`: once it fires the call returns
/// [`SdkError::Cancelled`](crate::domain::errors::SdkError::Cancelled)
/// without further attempts.
///
/// Batch methods return one entry per key the service answered. Keys the
/// service omitted are absent from the map; keys it failed carry
/// [`RemoteEvaluation::error`].
#[async_trait]
pub trait FlagApi: Send + Sync {
    /// Evaluate one flag
    async fn evaluate_flag(
        &self,
        flag_key: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<RemoteEvaluation>;

    /// Evaluate several flags in one request
    async fn evaluate_flags(
        &self,
        flag_keys: &[String],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<HashMap<String, RemoteEvaluation>>;

    /// Evaluate one gate; the value is a JSON boolean
    async fn evaluate_gate(
        &self,
        gate_key: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<RemoteEvaluation>;

    /// Evaluate several gates in one request
    async fn evaluate_gates(
        &self,
        gate_keys: &[String],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<HashMap<String, RemoteEvaluation>>;

    /// Report one analytics event
    async fn track_event(&self, event: &Event, cancel: &CancellationToken) -> SdkResult<()>;

    /// Report several analytics events in one request
    async fn track_events(&self, events: &[Event], cancel: &CancellationToken) -> SdkResult<()>;
}
