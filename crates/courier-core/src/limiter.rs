//! Periodic-reset token bucket.
//!
//! The bucket starts full. Each acquisition takes one token; once a full
//! `refill_period` has elapsed since the last refill the bucket is topped back
//! up to `capacity`. Refill is computed lazily on access, so an idle bucket
//! costs nothing.
//!
//! The same type backs the outbound client limiter (blocking [`acquire`]) and
//! per-handler cooldowns (non-blocking [`try_acquire`]).
//!
//! [`acquire`]: TokenBucket::acquire
//! [`try_acquire`]: TokenBucket::try_acquire

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// A token bucket that resets to full capacity once per period.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_period: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// A zero `capacity` is raised to 1 so `acquire` can always make progress.
    pub fn new(capacity: u32, refill_period: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_period,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// Takes a token if one is available.
    ///
    /// On denial returns how long until the next refill.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.tokens > 0 {
            state.tokens -= 1;
            Ok(())
        } else {
            let next_refill = state.last_refill + self.refill_period;
            Err(next_refill.saturating_duration_since(now))
        }
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "Token bucket empty, waiting");
                    // Never spin on a zero wait caused by clock granularity.
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Number of tokens that an acquisition made right now could draw from.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed < self.refill_period {
            return;
        }

        state.tokens = self.capacity;
        // Align to the period boundary so refills stay on a fixed cadence.
        let period_nanos = self.refill_period.as_nanos();
        state.last_refill = if period_nanos == 0 {
            now
        } else {
            let remainder = elapsed.as_nanos() % period_nanos;
            now - Duration::from_nanos(remainder as u64)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test(start_paused = true)]
    async fn test_capacity_acquires_never_block() {
        let bucket = TokenBucket::new(30, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..30 {
            let mut acquire = task::spawn(bucket.acquire());
            assert_ready!(acquire.poll());
        }

        assert_eq!(Instant::now(), start);
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_past_capacity_waits_for_refill() {
        let bucket = TokenBucket::new(30, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..30 {
            bucket.acquire().await;
        }

        let mut acquire = task::spawn(bucket.acquire());
        assert_pending!(acquire.poll());
        drop(acquire);

        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(bucket.available(), 29);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_reports_wait() {
        let bucket = TokenBucket::new(1, Duration::from_secs(10));
        assert!(bucket.try_acquire().is_ok());

        tokio::time::advance(Duration::from_secs(4)).await;
        let wait = bucket.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(6));

        tokio::time::advance(wait).await;
        assert!(bucket.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let bucket = TokenBucket::new(3, Duration::from_millis(100));
        bucket.try_acquire().unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(bucket.available(), 3);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let bucket = TokenBucket::new(0, Duration::from_secs(1));
        assert_eq!(bucket.capacity(), 1);
    }
}
