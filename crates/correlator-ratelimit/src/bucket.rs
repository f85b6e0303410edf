//! A single token bucket: `rate` tokens/second refilled continuously, up to
//! `burst` capacity.

use std::time::{Duration, Instant};

/// One tier's token bucket. Not `Sync` on its own — callers hold it behind
/// a `Mutex` so refill-and-consume stays atomic.
pub(crate) struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl TokenBucket {
    pub(crate) fn new(rate: u32, burst: u32) -> Self {
        let now = Instant::now();
        Self {
            rate: rate as f64,
            capacity: burst as f64,
            tokens: burst as f64,
            last_refill: now,
            last_access: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Attempts to consume one token, refilling first. Updates
    /// `last_access` on every call regardless of outcome, per the eviction
    /// contract.
    pub(crate) fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        self.refill(now);
        self.last_access = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access)
    }

    /// Backdates `last_access` for eviction tests.
    #[cfg(test)]
    pub(crate) fn backdate_last_access(&mut self, ago: Duration) {
        self.last_access -= ago;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_requests_all_succeed_then_deny() {
        let mut bucket = TokenBucket::new(1, 2);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn refill_over_time_restores_tokens() {
        let mut bucket = TokenBucket::new(10, 1);
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        bucket.last_refill -= Duration::from_millis(200);
        assert!(bucket.try_consume());
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let mut bucket = TokenBucket::new(100, 5);
        bucket.last_refill -= Duration::from_secs(10);
        bucket.refill(Instant::now());
        assert_eq!(bucket.tokens, 5.0);
    }
}
