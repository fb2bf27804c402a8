//! Bounded exponential-backoff execution of fallible async operations.
//!
//! [`retry_with_backoff`] wraps any async operation in a retry loop:
//! transient failures (per the caller's predicate) are retried with
//! exponentially growing, jittered delays; fatal failures short-circuit
//! immediately. On exhaustion the *original* final error is returned by
//! value, never wrapped — debugging depends on the provider's error
//! surviving intact.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first (must be ≥ 1).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Jitter fraction: each delay is scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::provider_api()
    }
}

impl RetryConfig {
    /// For provider API calls (music generation, stem separation).
    pub fn provider_api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(15),
            jitter: 0.1,
        }
    }

    /// For lightweight calls (balance checks, simple queries).
    pub fn lightweight() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
        }
    }

    /// For critical operations that must succeed if at all possible.
    pub fn critical() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

/// Compute the un-jittered delay before retrying after `attempt`
/// (1-based) failed: `min(max_delay, base * multiplier^(attempt - 1))`.
pub fn delay_for_attempt(attempt: u32, config: &RetryConfig) -> Duration {
    let exp = config.multiplier.powi(attempt.saturating_sub(1) as i32);
    let millis = (config.base_delay.as_millis() as f64 * exp) as u64;
    Duration::from_millis(millis).min(config.max_delay)
}

/// Scale a delay by a random factor in `[1 - jitter, 1 + jitter]`.
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
    Duration::from_millis((delay.as_millis() as f64 * factor).max(0.0) as u64)
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Run `operation` with bounded exponential backoff.
///
/// * `is_retryable` — decides whether an error is transient. A `false`
///   verdict short-circuits immediately without consuming the remaining
///   retry budget (4xx client errors must not be retried).
/// * `on_retry(&error, attempt)` — invoked before each sleep, for
///   observability only; it cannot affect control flow.
///
/// Returns the operation's success value, or the final error unmodified.
pub async fn retry_with_backoff<T, E, F, Fut, P, H>(
    mut operation: F,
    config: &RetryConfig,
    is_retryable: P,
    mut on_retry: H,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    H: FnMut(&E, u32),
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt == max_attempts || !is_retryable(&error) {
                    return Err(error);
                }

                on_retry(&error, attempt);

                let delay = apply_jitter(delay_for_attempt(attempt, config), config.jitter);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient failure",
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError {
        transient: bool,
        tag: &'static str,
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_sequence_grows_and_clamps() {
        let config = RetryConfig {
            max_attempts: 6,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(15),
            jitter: 0.0,
        };
        let delays: Vec<u64> = (1..=5)
            .map(|a| delay_for_attempt(a, &config).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 15, 15]);
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = apply_jitter(base, 0.1).as_millis();
            assert!((900..=1100).contains(&jittered), "jittered = {jittered}");
        }
    }

    #[tokio::test]
    async fn succeeds_first_try_without_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, TestError> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            },
            &fast_config(3),
            |e: &TestError| e.transient,
            |_, _| {},
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_invokes_exactly_max_attempts_and_preserves_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        transient: true,
                        tag: "always-fails",
                    })
                }
            },
            &fast_config(3),
            |e| e.transient,
            |_, _| {},
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert_eq!(err.tag, "always-fails");
        assert!(err.transient);
    }

    #[tokio::test]
    async fn fatal_error_short_circuits_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        transient: false,
                        tag: "bad-request",
                    })
                }
            },
            &fast_config(5),
            |e| e.transient,
            |_, _| {},
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().tag, "bad-request");
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, TestError> = retry_with_backoff(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError {
                            transient: true,
                            tag: "flaky",
                        })
                    } else {
                        Ok("done")
                    }
                }
            },
            &fast_config(5),
            |e| e.transient,
            |_, _| {},
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn on_retry_sees_each_failed_attempt_number() {
        let mut observed: Vec<u32> = Vec::new();
        let _: Result<(), TestError> = retry_with_backoff(
            || async {
                Err(TestError {
                    transient: true,
                    tag: "x",
                })
            },
            &fast_config(3),
            |e| e.transient,
            |_, attempt| observed.push(attempt),
        )
        .await;

        // The final attempt fails without a retry hook.
        assert_eq!(observed, vec![1, 2]);
    }
}
