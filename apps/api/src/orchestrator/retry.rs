//! Retry/backoff executor for single remote calls.
//!
//! Wraps one operation in a per-attempt deadline, classifies failures
//! (rate-limited / overloaded / timeout / other), and retries the transient
//! classes with exponential backoff plus jitter. Terminal failures and
//! exhausted retries propagate the original error unchanged — nothing is
//! silently swallowed here.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::llm_client::LlmError;

/// Deadline for one attempt, including network time.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

const BACKOFF_MULTIPLIER: f64 = 1.5;
const MAX_JITTER_MS: u64 = 500;
/// Extra linear backoff per attempt for high-cost requests, so expensive
/// retries don't starve budget for the cheap tier.
const HIGH_COST_PENALTY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// High-cost requests back off more aggressively.
    pub high_cost: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            high_cost: false,
        }
    }
}

/// Runs `op` until it succeeds, fails terminally, or attempts are exhausted.
///
/// `index` identifies the request in logs only — it never affects control
/// flow. A server retry-after hint overrides the computed backoff delay.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, index: usize, op: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(ATTEMPT_TIMEOUT, op()).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(ATTEMPT_TIMEOUT)),
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    info!("Request {index}: succeeded after {attempt} retries");
                }
                return Ok(value);
            }
            Err(err) => {
                if !err.kind().is_retryable() || attempt + 1 >= policy.max_attempts {
                    return Err(err);
                }

                let delay = match err.retry_after() {
                    Some(hint) => hint,
                    None => backoff_delay(policy, attempt) + jitter(),
                };

                warn!(
                    "Request {index}: {err}, retrying in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt + 1,
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Deterministic part of the backoff schedule (jitter is added by the caller).
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponential = policy.base_delay.as_millis() as f64 * BACKOFF_MULTIPLIER.powi(attempt as i32);
    let penalty = if policy.high_cost {
        HIGH_COST_PENALTY_MS * u64::from(attempt)
    } else {
        0
    };
    Duration::from_millis(exponential as u64 + penalty)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn api_error(status: u16, retry_after: Option<Duration>) -> LlmError {
        LlmError::Api {
            status,
            message: "err".to_string(),
            retry_after,
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            high_cost: false,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = execute(&quick_policy(), 0, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, LlmError>("ok".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_delays_next_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = Instant::now();
        let result = execute(&quick_policy(), 3, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(api_error(429, Some(Duration::from_secs(2))))
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(
            start.elapsed() >= Duration::from_secs(2),
            "second attempt launched after only {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overloaded_is_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = execute(&quick_policy(), 0, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(api_error(529, None))
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_propagate_original_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<String, _> = execute(&quick_policy(), 0, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(api_error(429, None))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(LlmError::Api { status: 429, .. }) => {}
            other => panic!("expected the original 429 back, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<String, _> = execute(&quick_policy(), 0, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(api_error(400, None))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(LlmError::Api { status: 400, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_is_timed_out_and_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = execute(&quick_policy(), 0, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    // Never completes within the attempt deadline.
                    tokio::time::sleep(ATTEMPT_TIMEOUT * 2).await;
                }
                Ok::<_, LlmError>("ok".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            high_cost: false,
        };
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(1500));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(2250));
    }

    #[test]
    fn test_high_cost_adds_linear_penalty() {
        let cheap = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            high_cost: false,
        };
        let costly = RetryPolicy {
            high_cost: true,
            ..cheap.clone()
        };
        for attempt in 0..4 {
            let expected = Duration::from_millis(HIGH_COST_PENALTY_MS * u64::from(attempt));
            assert_eq!(
                backoff_delay(&costly, attempt),
                backoff_delay(&cheap, attempt) + expected
            );
        }
    }
}
