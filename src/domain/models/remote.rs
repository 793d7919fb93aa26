use serde::{Deserialize, Serialize};

/// One key's answer from the flag service, independent of the wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvaluation {
    /// Resolved value
    pub value: serde_json::Value,

    /// Matched targeting rule
    #[serde(default)]
    pub rule_id: Option<String>,

    /// Served variation
    #[serde(default)]
    pub variation: Option<String>,

    /// Per-key failure reported inside a successful response
    #[serde(default)]
    pub error: Option<String>,
}

impl RemoteEvaluation {
    /// Successful evaluation with no rule metadata
    pub const fn value(value: serde_json::Value) -> Self {
        Self {
            value,
            rule_id: None,
            variation: None,
            error: None,
        }
    }

    /// Per-key failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            value: serde_json::Value::Null,
            rule_id: None,
            variation: None,
            error: Some(message.into()),
        }
    }
}
