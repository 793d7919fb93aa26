use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{SdkError, SdkResult};
use crate::domain::models::RetryConfig;

/// Retry policy with capped exponential backoff and jitter
///
/// Attempt `0` runs immediately. Attempt `k >= 1` first waits
/// `backoff(k)`, where the un-jittered delay is `min(base * 2^k, cap)` and
/// the jitter scales it by a uniform factor in `[1 - jitter, 1 + jitter]`.
/// A rate-limit error carrying a server retry-after waits that long instead,
/// capped at `cap`.
///
/// Only errors whose [`SdkError::is_retryable`] is true are retried.
/// Cancellation is observed before each attempt, while it runs, and during
/// the wait, and is never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a retry policy.
    ///
    /// `jitter` is clamped to `[0, 1)`; `cap` is raised to `base` if lower.
    ///
    /// # Example
    /// ```
    /// use flagcache::infrastructure::transport::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(30), 0.25);
    /// assert_eq!(policy.base_backoff(2), Duration::from_millis(400));
    /// ```
    pub fn new(max_retries: u32, base: Duration, cap: Duration, jitter: f64) -> Self {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 0.99)
        } else {
            0.0
        };
        Self {
            max_retries,
            base,
            cap: cap.max(base),
            jitter,
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.jitter,
        )
    }

    /// Retries after the initial attempt
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound on any single wait
    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Un-jittered delay: `min(base * 2^attempt, cap)`
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.cap)
    }

    /// Jittered delay before attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_backoff(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor)
    }

    /// Wait before attempt `attempt` after `err`; honors a server retry-after.
    pub fn delay_for(&self, err: &SdkError, attempt: u32) -> Duration {
        err.retry_delay()
            .map_or_else(|| self.backoff(attempt), |after| after.min(self.cap))
    }

    /// Run `operation` until it succeeds, fails permanently, exhausts its
    /// retries, or `cancel` fires.
    ///
    /// The closure receives the zero-based attempt number. On exhaustion the
    /// last error is returned.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> SdkResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SdkResult<T>>,
    {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(SdkError::Cancelled),
                result = operation(attempt) => result,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, code = err.code(), "not retrying");
                return Err(err);
            }
            if attempt >= self.max_retries {
                warn!(attempts = attempt + 1, error = %err, "request failed after all retries");
                return Err(err);
            }

            attempt += 1;
            let delay = self.delay_for(&err, attempt);
            debug!(
                attempt,
                backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying after transient error"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SdkError::Cancelled),
                () = sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn server_error() -> SdkError {
        SdkError::http_status("HTTP 502", 502, "http://test")
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(10), 0.0)
    }

    #[test]
    fn test_base_backoff_doubles_until_cap() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(30), 0.25);
        assert_eq!(policy.base_backoff(0), Duration::from_millis(100));
        assert_eq!(policy.base_backoff(1), Duration::from_millis(200));
        assert_eq!(policy.base_backoff(3), Duration::from_millis(800));
        assert_eq!(policy.base_backoff(9), Duration::from_secs(30));
        assert_eq!(policy.base_backoff(64), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(30), 0.25);
        for attempt in 0..8 {
            let base = policy.base_backoff(attempt);
            for _ in 0..50 {
                let jittered = policy.backoff(attempt);
                assert!(jittered >= base.mul_f64(0.75), "{jittered:?} < 0.75 * {base:?}");
                assert!(jittered <= base.mul_f64(1.25), "{jittered:?} > 1.25 * {base:?}");
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1), 0.0);
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(5), 0.0);
        let limited = SdkError::RateLimit {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(policy.delay_for(&limited, 1), Duration::from_secs(5));

        let short = SdkError::RateLimit {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.delay_for(&short, 1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(&server_error(), 1), Duration::from_millis(200));
    }

    #[test]
    fn test_zero_retry_after_falls_back_to_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(5), 0.0);
        let immediate = SdkError::RateLimit {
            message: "slow down".to_string(),
            retry_after: Some(Duration::ZERO),
        };
        assert_eq!(policy.delay_for(&immediate, 1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(&immediate, 2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = fast_policy(3)
            .execute(&CancellationToken::new(), |_| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(server_error())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_initial_plus_max_retries_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: SdkResult<()> = fast_policy(3)
            .execute(&CancellationToken::new(), |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;

        assert!(matches!(result, Err(SdkError::Network { status: Some(502), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: SdkResult<()> = fast_policy(3)
            .execute(&CancellationToken::new(), |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SdkError::Authentication {
                        message: "bad key".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SdkError::Authentication { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_numbers_are_sequential() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        let _: SdkResult<()> = fast_policy(2)
            .execute(&CancellationToken::new(), |attempt| {
                log.lock().unwrap().push(attempt);
                async { Err(server_error()) }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_the_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: SdkResult<()> = fast_policy(3)
            .execute(&cancel, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(SdkError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff_sleep() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10), Duration::from_secs(30), 0.0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: SdkResult<()> = policy
            .execute(&cancel, |_| async { Err(server_error()) })
            .await;

        assert!(matches!(result, Err(SdkError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: SdkResult<()> = fast_policy(3)
            .execute(&cancel, |_| async {
                sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SdkError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
