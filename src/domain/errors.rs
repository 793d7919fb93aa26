//! Error taxonomy for flag evaluation, transport and cache operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed underlying cause carried by transport errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable classification of an [`SdkError`].
///
/// This is the part of an error that survives into an
/// [`EvaluationResult`](crate::domain::models::EvaluationResult): it is `Copy`,
/// serializable and cheap to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failure, 5xx, or an unclassified HTTP error
    Network,
    /// HTTP 401
    Authentication,
    /// HTTP 400 or a request that could not be built
    Validation,
    /// HTTP 429
    RateLimit,
    /// HTTP 408 or a client-side request timeout
    Timeout,
    /// Local cache or persistence failure
    Cache,
    /// Invalid configuration or a closed client
    Config,
    /// The caller cancelled the operation or its deadline fired
    Cancelled,
}

impl ErrorKind {
    /// Stable error code, as reported in logs and JSON output.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::RateLimit => "RATE_LIMIT_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Cache => "CACHE_ERROR",
            Self::Config => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors produced by the SDK core.
///
/// Retry eligibility is decided here and nowhere else: the transport asks
/// [`SdkError::is_retryable`] after every failed attempt.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Transport failure or an HTTP error without a more specific mapping
    #[error("network error: {message}")]
    Network {
        /// Human readable description
        message: String,
        /// HTTP status, `None` when no response was received
        status: Option<u16>,
        /// Request URL
        url: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid or missing API key (HTTP 401)
    #[error("authentication failed: {message}")]
    Authentication {
        /// Human readable description
        message: String,
    },

    /// Request rejected as malformed (HTTP 400)
    #[error("validation failed: {message}")]
    Validation {
        /// Human readable description
        message: String,
        /// Offending field, when the server names one
        field: Option<String>,
    },

    /// Too many requests (HTTP 429)
    #[error("rate limit exceeded: {message}")]
    RateLimit {
        /// Human readable description
        message: String,
        /// Server-supplied wait before the next attempt
        retry_after: Option<Duration>,
    },

    /// Request timed out (HTTP 408 or client-side timeout)
    #[error("request timed out: {message}")]
    Timeout {
        /// Human readable description
        message: String,
    },

    /// Local cache or persistence failure
    #[error("cache error during {operation}: {message}")]
    Cache {
        /// Human readable description
        message: String,
        /// Cache operation that failed
        operation: String,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config {
        /// Human readable description
        message: String,
        /// Offending configuration field
        field: Option<String>,
    },

    /// Cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,
}

impl SdkError {
    /// Network error for a request that never produced a response.
    pub fn connection(message: impl Into<String>, url: impl Into<String>, source: BoxError) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
            url: url.into(),
            source: Some(source),
        }
    }

    /// Network error carrying an HTTP status.
    pub fn http_status(message: impl Into<String>, status: u16, url: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: Some(status),
            url: url.into(),
            source: None,
        }
    }

    /// Configuration error.
    pub fn config(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Config {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cache { .. } => ErrorKind::Cache,
            Self::Config { .. } => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Returns true if the failed request may succeed when attempted again.
    ///
    /// | Condition | Retryable |
    /// |---|---|
    /// | no response (connection failure) | yes |
    /// | HTTP 401 / 400 | no |
    /// | HTTP 429 / 408 | yes |
    /// | HTTP >= 500 | yes |
    /// | other 4xx | no |
    /// | cancellation | no |
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { status: None, .. } => true,
            Self::Network {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429 || *status == 408,
            Self::RateLimit { .. } | Self::Timeout { .. } => true,
            Self::Authentication { .. }
            | Self::Validation { .. }
            | Self::Cache { .. }
            | Self::Config { .. }
            | Self::Cancelled => false,
        }
    }

    /// Returns true if the failure is expected to clear up on its own.
    pub const fn is_temporary(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimit { .. }
        )
    }

    /// Server-recommended delay before retrying, if any. A zero delay counts
    /// as none.
    pub const fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimit {
                retry_after: Some(after),
                ..
            } if !after.is_zero() => Some(*after),
            _ => None,
        }
    }

    /// HTTP status attached to the error, if one was received.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::Authentication { .. } => Some(401),
            Self::Validation { .. } => Some(400),
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }
}

/// Result alias for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;
