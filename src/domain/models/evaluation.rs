//! Evaluation results returned to callers and stored in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{ErrorKind, SdkError};
use crate::domain::models::remote::RemoteEvaluation;

/// Why an evaluation produced its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    /// Value came from the flag service
    ApiEvaluation,
    /// The fetch failed and the caller's default was used
    ErrorFallback,
    /// The service returned no entry for this key
    NotFound,
    /// The caller's default was used without a fetch
    Default,
}

impl EvaluationReason {
    /// Wire name of the reason
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiEvaluation => "api_evaluation",
            Self::ErrorFallback => "error_fallback",
            Self::NotFound => "not_found",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced on a fallback result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human readable description
    pub message: String,
}

impl From<&SdkError> for ResultError {
    fn from(err: &SdkError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of evaluating a flag or gate for one user
///
/// Values are owned: the cache hands out clones, so mutating a returned
/// result never affects the cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Flag or gate key
    pub key: String,

    /// Resolved value
    pub value: serde_json::Value,

    /// How the value was resolved
    pub reason: EvaluationReason,

    /// Matched targeting rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Served variation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,

    /// When the value was resolved
    pub evaluated_at: DateTime<Utc>,

    /// Whether this result was served from the cache
    #[serde(default)]
    pub cache_hit: bool,

    /// Failure behind a fallback value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

impl EvaluationResult {
    /// Result built from a successful remote evaluation.
    pub fn from_remote(key: impl Into<String>, remote: RemoteEvaluation) -> Self {
        Self {
            key: key.into(),
            value: remote.value,
            reason: EvaluationReason::ApiEvaluation,
            rule_id: remote.rule_id,
            variation: remote.variation,
            evaluated_at: Utc::now(),
            cache_hit: false,
            error: None,
        }
    }

    /// Fallback carrying the caller's default and the failure that caused it.
    pub fn error_fallback(key: impl Into<String>, default: serde_json::Value, err: &SdkError) -> Self {
        Self {
            key: key.into(),
            value: default,
            reason: EvaluationReason::ErrorFallback,
            rule_id: None,
            variation: None,
            evaluated_at: Utc::now(),
            cache_hit: false,
            error: Some(ResultError::from(err)),
        }
    }

    /// Fallback for a key the service did not return.
    pub fn not_found(key: impl Into<String>, default: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value: default,
            reason: EvaluationReason::NotFound,
            rule_id: None,
            variation: None,
            evaluated_at: Utc::now(),
            cache_hit: false,
            error: None,
        }
    }

    /// Result resolved from a remote answer that may carry a per-key error.
    pub fn from_remote_or_fallback(
        key: impl Into<String>,
        remote: RemoteEvaluation,
        default: serde_json::Value,
    ) -> Self {
        let key = key.into();
        match remote.error.clone() {
            Some(message) => {
                let err = SdkError::Network {
                    message,
                    status: None,
                    url: String::new(),
                    source: None,
                };
                Self::error_fallback(key, default, &err)
            }
            None => Self::from_remote(key, remote),
        }
    }

    /// True when the value came from the flag service.
    pub fn is_success(&self) -> bool {
        self.reason == EvaluationReason::ApiEvaluation && self.error.is_none()
    }

    /// Boolean view of the value, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// Copy of this result marked as served from the cache.
    #[must_use]
    pub fn into_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(value: serde_json::Value) -> RemoteEvaluation {
        RemoteEvaluation {
            value,
            rule_id: Some("rule-1".to_string()),
            variation: Some("treatment".to_string()),
            error: None,
        }
    }

    #[test]
    fn test_from_remote() {
        let result = EvaluationResult::from_remote("checkout", remote(json!("blue")));
        assert_eq!(result.key, "checkout");
        assert_eq!(result.value, json!("blue"));
        assert_eq!(result.reason, EvaluationReason::ApiEvaluation);
        assert_eq!(result.rule_id.as_deref(), Some("rule-1"));
        assert!(!result.cache_hit);
        assert!(result.is_success());
    }

    #[test]
    fn test_error_fallback_carries_kind() {
        let err = SdkError::Authentication {
            message: "bad key".to_string(),
        };
        let result = EvaluationResult::error_fallback("checkout", json!(false), &err);
        assert_eq!(result.value, json!(false));
        assert_eq!(result.reason, EvaluationReason::ErrorFallback);
        assert_eq!(
            result.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Authentication)
        );
        assert!(!result.is_success());
    }

    #[test]
    fn test_per_key_remote_error_falls_back() {
        let mut failed = remote(json!(true));
        failed.error = Some("flag disabled for environment".to_string());
        let result = EvaluationResult::from_remote_or_fallback("beta", failed, json!(false));
        assert_eq!(result.reason, EvaluationReason::ErrorFallback);
        assert_eq!(result.value, json!(false));
        assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::Network));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = EvaluationResult::from_remote("cfg", remote(json!({"limit": 5})));
        let mut copy = original.clone().into_cache_hit();
        copy.value["limit"] = json!(50);
        assert_eq!(original.value, json!({"limit": 5}));
        assert!(!original.cache_hit);
        assert!(copy.cache_hit);
    }

    #[test]
    fn test_serialization_shape() {
        let result = EvaluationResult::not_found("missing", json!(1));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["reason"], "not_found");
        assert_eq!(value["cache_hit"], false);
        assert!(value.get("rule_id").is_none());
        assert!(value.get("error").is_none());

        let back: EvaluationResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }
}
