// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry policies and timeout configuration for resilient agent-loop and
//! tool-call execution.
//!
//! Provides exponential backoff with jitter, a configurable attempt cap and
//! overall timeout, and per-attempt metadata suitable for embedding in an
//! [`InvocationReceipt`](crate::invocation::InvocationReceipt).

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for retry behaviour around a fallible async operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial attempt.
    /// `0` means only the initial attempt (no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Overall wall-clock timeout across all attempts.
    #[serde(with = "duration_millis")]
    pub overall_timeout: Duration,
    /// Jitter factor in `[0.0, 1.0]`. 0 = no jitter, 1 = full jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(60),
            jitter_factor: 0.5,
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Start from the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    /// Set the maximum number of retry attempts after the initial one.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.policy.base_delay = base_delay;
        self
    }

    /// Set the maximum delay cap.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.policy.max_delay = max_delay;
        self
    }

    /// Set the overall wall-clock timeout across all attempts.
    #[must_use]
    pub fn overall_timeout(mut self, overall_timeout: Duration) -> Self {
        self.policy.overall_timeout = overall_timeout;
        self
    }

    /// Set the jitter factor, clamped to `[0.0, 1.0]` at use time.
    #[must_use]
    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.policy.jitter_factor = jitter_factor;
        self
    }

    /// Build the policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Standalone timeout configuration, usable independently of a full
/// [`RetryPolicy`] (e.g. for a single tool call with no retry).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Maximum wall-clock duration for the operation.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl TimeoutConfig {
    /// Create a timeout configuration for the given duration.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

/// Serde helper — `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        val.as_millis().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Record of a single failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-indexed attempt number.
    pub attempt: u32,
    /// Error message from this attempt.
    pub error: String,
    /// Backoff delay applied before the next attempt.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

/// Metadata captured across all retry attempts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Total number of attempts made (including the successful one).
    pub total_attempts: u32,
    /// Records of each *failed* attempt.
    pub failed_attempts: Vec<RetryAttempt>,
    /// Wall-clock time spanning all attempts.
    #[serde(with = "duration_millis")]
    pub total_duration: Duration,
}

/// Result of a retry-enabled operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The successfully produced value.
    pub value: T,
    /// Retry metadata (empty `failed_attempts` when the first attempt succeeds).
    pub metadata: RetryMetadata,
}

/// Errors produced by the retry loop itself (distinct from the wrapped
/// operation's own error type `E`).
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The wrapped operation returned an error (possibly after retries).
    #[error(transparent)]
    Operation(E),
    /// The overall timeout elapsed before a successful attempt.
    #[error("overall retry timeout of {0:?} elapsed")]
    TimedOut(Duration),
}

// ---------------------------------------------------------------------------
// Backoff computation
// ---------------------------------------------------------------------------

/// Compute the backoff delay for a given zero-indexed attempt number.
#[must_use]
pub fn compute_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let delay_ms = (policy.base_delay.as_millis() as u64).saturating_mul(exp);
    let capped_ms = delay_ms.min(policy.max_delay.as_millis() as u64);

    let jitter_factor = policy.jitter_factor.clamp(0.0, 1.0);
    if jitter_factor > 0.0 && capped_ms > 0 {
        let jitter_range = (capped_ms as f64 * jitter_factor) as u64;
        let nanos =
            SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().subsec_nanos() as u64;
        let pseudo = nanos.wrapping_mul(u64::from(attempt) + 1);
        let jitter = if jitter_range > 0 { pseudo % jitter_range } else { 0 };
        Duration::from_millis(capped_ms.saturating_sub(jitter))
    } else {
        Duration::from_millis(capped_ms)
    }
}

// ---------------------------------------------------------------------------
// Core retry loop
// ---------------------------------------------------------------------------

/// Generic retry loop. Calls `op` up to `policy.max_retries + 1` times with
/// exponential backoff, returning the first successful result along with
/// metadata about failed attempts.
///
/// `retryable` decides whether a given error should trigger a retry; a
/// non-retryable error is returned immediately without consuming further
/// attempts.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
    retryable: fn(&E) -> bool,
) -> Result<RetryOutcome<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_retries + 1;
    let mut failed_attempts = Vec::new();

    for attempt in 0..max_attempts {
        if start.elapsed() >= policy.overall_timeout {
            warn!(target: "agentspec.retry", attempt, "overall timeout exceeded");
            return Err(RetryError::TimedOut(policy.overall_timeout));
        }

        debug!(target: "agentspec.retry", attempt, max_attempts, "attempting operation");

        match op().await {
            Ok(value) => {
                let total_duration = start.elapsed();
                debug!(
                    target: "agentspec.retry",
                    attempt,
                    total_duration_ms = total_duration.as_millis() as u64,
                    "operation succeeded"
                );
                return Ok(RetryOutcome {
                    value,
                    metadata: RetryMetadata { total_attempts: attempt + 1, failed_attempts, total_duration },
                });
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;

                if !retryable(&err) {
                    debug!(target: "agentspec.retry", error = %err, "non-retryable error, giving up");
                    return Err(RetryError::Operation(err));
                }

                if is_last {
                    warn!(target: "agentspec.retry", error = %err, attempt, "max retries exhausted");
                    return Err(RetryError::Operation(err));
                }

                let delay = compute_delay(policy, attempt);
                warn!(
                    target: "agentspec.retry",
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable error, backing off"
                );

                failed_attempts.push(RetryAttempt { attempt, error: err.to_string(), delay });

                let remaining = policy.overall_timeout.saturating_sub(start.elapsed());
                if delay > remaining {
                    return Err(RetryError::TimedOut(policy.overall_timeout));
                }

                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(RetryError::TimedOut(policy.overall_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let policy = RetryPolicyBuilder::new().max_retries(3).build();
        let outcome = retry_async::<_, String, _, _>(&policy, || async { Ok(42) }, |_| true).await.unwrap();
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.metadata.total_attempts, 1);
        assert!(outcome.metadata.failed_attempts.is_empty());
    }

    #[tokio::test]
    async fn retries_until_success_within_max_retries() {
        let policy =
            RetryPolicyBuilder::new().max_retries(3).base_delay(Duration::from_millis(1)).jitter_factor(0.0).build();
        let attempts = AtomicU32::new(0);
        let outcome = retry_async::<_, String, _, _>(
            &policy,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("transient".to_string()) } else { Ok(n) } }
            },
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.value, 2);
        assert_eq!(outcome.metadata.failed_attempts.len(), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_gives_up_immediately() {
        let policy = RetryPolicyBuilder::new().max_retries(5).build();
        let attempts = AtomicU32::new(0);
        let result = retry_async::<(), String, _, _>(
            &policy,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            },
            |_| false,
        )
        .await;
        assert!(matches!(result, Err(RetryError::Operation(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn compute_delay_respects_max_delay_cap() {
        let policy = RetryPolicyBuilder::new()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .jitter_factor(0.0)
            .build();
        let delay = compute_delay(&policy, 10);
        assert!(delay <= Duration::from_millis(500));
    }
}
