//! Token-bucket admission control for the Anthropic API.
//!
//! One bucket per process, shared by every in-flight evaluation request.
//! Units are output tokens — a proxy for remote API capacity, unrelated to
//! authentication tokens. The bucket refills continuously (not in fixed
//! windows), so a caller short on budget waits only for its own shortfall.
//!
//! This component never fails; it only delays. Callers that cannot tolerate
//! an unbounded wait wrap `acquire` in their own timeout (the dispatcher
//! uses a 10s ceiling and proceeds without budget past it).

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound on a single wait slice. Keeps a caller far from the front of
/// the queue responsive to refills freed up by completed siblings.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

struct BucketState {
    available: f64,
    last_refill: Instant,
}

/// Continuous token-bucket rate limiter.
///
/// Invariant: `0 <= available <= capacity` at every observation point.
/// Refill and debit are applied atomically under the lock; sleeps happen
/// outside it so concurrent acquirers never block each other's refills.
pub struct TokenBucket {
    capacity: f64,
    refill_per_minute: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Bucket starts full; refill rate equals capacity per minute.
    pub fn new(capacity_per_minute: f64) -> Self {
        Self {
            capacity: capacity_per_minute,
            refill_per_minute: capacity_per_minute,
            state: Mutex::new(BucketState {
                available: capacity_per_minute,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Suspends until `units` are available, then atomically debits them.
    pub async fn acquire(&self, units: u32) {
        // A request larger than the whole bucket could never be satisfied.
        let needed = f64::from(units).min(self.capacity);

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.available >= needed {
                    state.available -= needed;
                    return;
                }

                let shortfall = needed - state.available;
                // Whole milliseconds, rounded up: float refill slices leave
                // sub-millisecond shortfalls near the target, and a wait that
                // rounds to zero would re-check without any time passing.
                Duration::from_millis(
                    (shortfall / self.refill_per_minute * 60_000.0).ceil().max(1.0) as u64,
                )
            };

            let wait = wait.min(MAX_POLL_INTERVAL);
            debug!(
                "Token bucket: waiting {}ms for {} tokens",
                wait.as_millis(),
                units
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Currently available units, after a refill. Observability only.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.available
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed_minutes = now.duration_since(state.last_refill).as_secs_f64() / 60.0;
        state.available =
            (state.available + elapsed_minutes * self.refill_per_minute).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_debits_immediately_when_full() {
        let bucket = TokenBucket::new(1000.0);
        bucket.acquire(400).await;
        assert!((bucket.available().await - 600.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::new(600.0);
        bucket.acquire(600).await;

        // 300 tokens refill in 30s at 600/min.
        let start = Instant::now();
        bucket.acquire(300).await;
        assert!(
            start.elapsed() >= Duration::from_secs(30),
            "waited only {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_never_exceeds_capacity() {
        let bucket = TokenBucket::new(1000.0);
        bucket.acquire(100).await;

        // Far more than enough time to refill the debit several times over.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(bucket.available().await <= 1000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquirers_never_over_debit() {
        let bucket = Arc::new(TokenBucket::new(100.0));

        // Two 60-token acquires against 100 available: the second must wait
        // for at least the 20-token shortfall to refill (12s at 100/min).
        let start = Instant::now();
        let a = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(60).await }
        });
        let b = tokio::spawn({
            let bucket = bucket.clone();
            async move { bucket.acquire(60).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert!(
            start.elapsed() >= Duration::from_secs(12),
            "both acquires settled after only {:?}",
            start.elapsed()
        );
        assert!(bucket.available().await >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_refill_converges_on_target() {
        // 100/min refills 8.333... tokens per capped 5s poll, so the final
        // re-checks land fractions of a token short of the target. Rounding
        // each wait up to a whole millisecond keeps every pass moving the
        // clock forward until the acquire settles.
        let bucket = TokenBucket::new(100.0);
        bucket.acquire(100).await;

        let start = Instant::now();
        bucket.acquire(60).await;
        assert!(
            start.elapsed() >= Duration::from_secs(36),
            "waited only {:?}",
            start.elapsed()
        );
        assert!(
            start.elapsed() < Duration::from_secs(40),
            "acquire took {:?} to settle",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_request_is_clamped_to_capacity() {
        let bucket = TokenBucket::new(100.0);
        // Must settle rather than wait forever.
        bucket.acquire(500).await;
        assert!(bucket.available().await < 1.0);
    }
}
