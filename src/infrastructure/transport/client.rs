use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::retry::RetryPolicy;
use super::types::ApiError;
use crate::domain::errors::{SdkError, SdkResult};
use crate::domain::models::Config;
use crate::services::metrics::MetricsCollector;

/// `User-Agent` sent with every request
pub const USER_AGENT: &str = concat!("flagcache/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the flag service with classified retries
///
/// Features:
/// - Connection pooling and reuse (via `reqwest::Client`)
/// - Per-attempt timeout from configuration
/// - Exponential backoff with jitter for retryable errors
/// - Status-to-error classification that decides retry eligibility
/// - Cooperative cancellation of in-flight requests and backoff waits
pub struct ResilientTransport {
    http_client: ReqwestClient,
    base_url: String,
    retry_policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

/// Records exactly one API call per attempt, including attempts dropped by
/// cancellation.
struct AttemptRecorder<'a> {
    metrics: &'a MetricsCollector,
    started: Instant,
    success: bool,
}

impl Drop for AttemptRecorder<'_> {
    fn drop(&mut self) {
        self.metrics
            .record_api_call(self.started.elapsed(), self.success);
    }
}

impl ResilientTransport {
    /// Build a transport from configuration.
    ///
    /// Fails with a configuration error when the API key is not a valid
    /// header value or the HTTP client cannot be built.
    pub fn new(config: &Config, metrics: Arc<MetricsCollector>) -> SdkResult<Self> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&config.api_key).map_err(|_| {
            SdkError::config("API key contains invalid header characters", Some("api_key"))
        })?;
        api_key.set_sensitive(true);
        headers.insert("X-API-Key", api_key);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let http_client = ReqwestClient::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| SdkError::config(format!("failed to build HTTP client: {e}"), None))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::from_config(&config.retry),
            metrics,
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a JSON request, retrying per the retry policy.
    ///
    /// Returns [`SdkError::Cancelled`] as soon as `cancel` fires, whether the
    /// request is in flight or waiting to retry.
    #[instrument(skip(self, body, cancel))]
    pub async fn execute<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> SdkResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Send,
    {
        let url = self.url(path);
        self.retry_policy
            .execute(cancel, |attempt| self.attempt(method.clone(), &url, body, attempt))
            .await
    }

    async fn attempt<B, R>(&self, method: Method, url: &str, body: Option<&B>, attempt: u32) -> SdkResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Send,
    {
        let mut recorder = AttemptRecorder {
            metrics: &self.metrics,
            started: Instant::now(),
            success: false,
        };
        let outcome = self.send(method, url, body).await;
        recorder.success = outcome.is_ok();

        match &outcome {
            Ok(_) => debug!(attempt, url, elapsed_ms = elapsed_ms(recorder.started), "request succeeded"),
            Err(e) => debug!(
                attempt,
                url,
                status = ?e.status(),
                code = e.code(),
                error = %e,
                "request attempt failed"
            ),
        }
        outcome
    }

    async fn send<B, R>(&self, method: Method, url: &str, body: Option<&B>) -> SdkResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Send,
    {
        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(e, url))?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.bytes().await.unwrap_or_default();
            return Err(classify_status(status, &body, retry_after, url));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, url))?;
        parse_success_body(status, &bytes, url)
    }
}

impl std::fmt::Debug for ResilientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientTransport")
            .field("base_url", &self.base_url)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Map a failure that produced no HTTP response.
///
/// A client-side timeout is a network failure; [`SdkError::Timeout`] is
/// reserved for a server answering 408.
fn classify_transport_error(err: reqwest::Error, url: &str) -> SdkError {
    if err.is_builder() {
        return SdkError::Validation {
            message: format!("could not build request: {err}"),
            field: None,
        };
    }
    let status = err.status().map(|s| s.as_u16());
    let message = if err.is_timeout() {
        format!("request to {url} timed out")
    } else {
        "request failed".to_string()
    };
    SdkError::Network {
        message,
        status,
        url: url.to_string(),
        source: Some(Box::new(err)),
    }
}

/// `Retry-After` header in whole seconds
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Error object from a failure body: either `{code, message, details}` or an
/// envelope `{success: false, error: {...}}`.
fn parse_error_body(body: &[u8]) -> Option<ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;
    let inner = match object.get("error") {
        Some(error @ serde_json::Value::Object(_)) => error.clone(),
        _ => value.clone(),
    };
    serde_json::from_value(inner).ok()
}

/// Map a non-2xx response to the error taxonomy.
///
/// | Status | Error |
/// |---|---|
/// | 401 | Authentication |
/// | 400 | Validation |
/// | 429 | `RateLimit` (retry-after from header, else `details`) |
/// | 408 | Timeout |
/// | other | Network carrying the status |
///
/// A body that is not a JSON error object yields a Network error carrying
/// the status, except for 429, which stays a `RateLimit` so the header's
/// retry-after still applies.
pub(crate) fn classify_status(
    status: StatusCode,
    body: &[u8],
    retry_after: Option<Duration>,
    url: &str,
) -> SdkError {
    let code = status.as_u16();
    let Some(api_error) = parse_error_body(body) else {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return SdkError::RateLimit {
                message: format!("HTTP {code}"),
                retry_after,
            };
        }
        return SdkError::http_status(format!("HTTP {code}"), code, url);
    };
    let message = api_error.describe();

    match status {
        StatusCode::UNAUTHORIZED => SdkError::Authentication { message },
        StatusCode::BAD_REQUEST => SdkError::Validation {
            message,
            field: None,
        },
        StatusCode::TOO_MANY_REQUESTS => SdkError::RateLimit {
            message,
            retry_after: retry_after
                .or_else(|| api_error.details_seconds().map(Duration::from_secs)),
        },
        StatusCode::REQUEST_TIMEOUT => SdkError::Timeout { message },
        _ => SdkError::http_status(message, code, url),
    }
}

/// Decode a 2xx body, rejecting `{success: false, error: {...}}` envelopes.
///
/// An empty body decodes as JSON `null`.
pub(crate) fn parse_success_body<R: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
    url: &str,
) -> SdkResult<R> {
    let code = status.as_u16();
    let value: serde_json::Value = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(body).map_err(|e| SdkError::Network {
            message: format!("failed to parse response: {e}"),
            status: Some(code),
            url: url.to_string(),
            source: Some(Box::new(e)),
        })?
    };

    if value.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .cloned()
            .and_then(|e| serde_json::from_value::<ApiError>(e).ok())
            .map_or_else(|| "request unsuccessful".to_string(), |e| e.describe());
        return Err(SdkError::http_status(message, code, url));
    }

    serde_json::from_value(value).map_err(|e| SdkError::Network {
        message: format!("unexpected response shape: {e}"),
        status: Some(code),
        url: url.to_string(),
        source: Some(Box::new(e)),
    })
}
