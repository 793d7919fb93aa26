//! Deterministic cache keys for evaluation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyspace a cached result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Flag evaluations
    Flag,
    /// Gate evaluations
    Gate,
}

impl Namespace {
    /// Prefix used in rendered keys
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Gate => "gate",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key derived from `(namespace, entity key, user id, environment)`
///
/// Rendered as `{ns}:{entity}:user:{user}:env:{env}`. Components are
/// percent-escaped so a `:` inside one of them cannot make two different
/// tuples render to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for one evaluation.
    pub fn derive(namespace: Namespace, entity_key: &str, user_id: &str, environment: &str) -> Self {
        Self(format!(
            "{}:{}:user:{}:env:{}",
            namespace,
            escape(entity_key),
            escape(user_id),
            escape(environment)
        ))
    }

    /// Key for a flag evaluation.
    pub fn flag(flag_key: &str, user_id: &str, environment: &str) -> Self {
        Self::derive(Namespace::Flag, flag_key, user_id, environment)
    }

    /// Key for a gate evaluation.
    pub fn gate(gate_key: &str, user_id: &str, environment: &str) -> Self {
        Self::derive(Namespace::Gate, gate_key, user_id, environment)
    }

    /// Rendered key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the rendered string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape(component: &str) -> String {
    if !component.contains(['%', ':']) {
        return component.to_string();
    }
    component.replace('%', "%25").replace(':', "%3A")
}
