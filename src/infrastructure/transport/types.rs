//! Request and response bodies for the flag service HTTP API
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::{Event, RemoteEvaluation, UserContext};

/// `POST /api/v1/sdk/evaluate`
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateFlagRequest<'a> {
    pub flag_key: &'a str,
    pub context: &'a UserContext,
}

/// `POST /api/v1/sdk/evaluate/batch`
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvaluateFlagsRequest<'a> {
    pub flag_keys: &'a [String],
    pub context: &'a UserContext,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub environment: &'a str,
}

/// `POST /api/v1/sdk/feature-gates/evaluate`
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateGateRequest<'a> {
    pub gate_key: &'a str,
    pub context: &'a UserContext,
}

/// `POST /api/v1/sdk/feature-gates/evaluate/batch`
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvaluateGatesRequest<'a> {
    pub gate_keys: &'a [String],
    pub user_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub environment: &'a str,
    pub user_context: &'a UserContext,
}

/// `POST /api/v1/sdk/events/batch`; single events are sent as the bare
/// [`Event`] to `/api/v1/sdk/events`
#[derive(Debug, Clone, Serialize)]
pub struct BatchTrackEventsRequest<'a> {
    pub events: &'a [Event],
}

/// Error object carried by failed responses and per-key batch entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Free-form details; for 429 responses a retry-after in seconds
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Message, falling back to the code
    pub fn describe(&self) -> String {
        match (&self.message, &self.code) {
            (Some(message), _) if !message.is_empty() => message.clone(),
            (_, Some(code)) if !code.is_empty() => code.clone(),
            _ => "unknown error".to_string(),
        }
    }

    /// `details` interpreted as whole seconds
    pub fn details_seconds(&self) -> Option<u64> {
        match self.details.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Single flag evaluation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResponse {
    #[serde(default)]
    pub flag_key: String,
    #[serde(default)]
    pub enabled: bool,
    /// Typed value; absent for plain on/off flags
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub variation: Option<String>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

impl From<FlagResponse> for RemoteEvaluation {
    fn from(response: FlagResponse) -> Self {
        Self {
            value: response
                .value
                .unwrap_or(serde_json::Value::Bool(response.enabled)),
            rule_id: response.rule_id,
            variation: response.variation,
            error: response.error.map(|e| e.describe()),
        }
    }
}

/// Single gate evaluation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResponse {
    #[serde(default)]
    pub gate_key: String,
    #[serde(default)]
    pub enabled: bool,
    /// Access decision; falls back to `enabled` when absent
    #[serde(default)]
    pub access_granted: Option<bool>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

impl From<GateResponse> for RemoteEvaluation {
    fn from(response: GateResponse) -> Self {
        let granted = response.access_granted.unwrap_or(response.enabled);
        Self {
            value: serde_json::Value::Bool(granted),
            rule_id: None,
            variation: None,
            error: response.error.map(|e| e.describe()),
        }
    }
}

/// Batch response keyed by flag or gate key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse<T> {
    #[serde(default = "HashMap::new")]
    pub results: HashMap<String, T>,
}

impl<T: Into<RemoteEvaluation>> BatchResponse<T> {
    /// Per-key remote evaluations
    pub fn into_evaluations(self) -> HashMap<String, RemoteEvaluation> {
        self.results
            .into_iter()
            .map(|(key, response)| (key, response.into()))
            .collect()
    }
}
