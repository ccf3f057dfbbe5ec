//! Token-bucket rate limiting for REST endpoints.
//!
//! One limiter instance guards each endpoint group (public and
//! authenticated). Tokens refill continuously at `refill_rate` per second
//! up to a burst ceiling. The async [`RateLimiter::acquire`] blocks the
//! calling path until a token is available — callers wait, they do not
//! fail fast.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Thread-safe token bucket.
pub struct RateLimiter {
    max_tokens: u32,
    refill_rate: f64,
    tokens: Mutex<f64>,
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter with `max_tokens` burst capacity refilling at
    /// `refill_rate` tokens per second.
    pub fn new(max_tokens: u32, refill_rate: f64) -> Self {
        Self {
            max_tokens,
            refill_rate,
            tokens: Mutex::new(max_tokens as f64),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Limiter for unauthenticated endpoints (ticker lookups).
    pub fn public_default() -> Self {
        Self::new(60, 1.0)
    }

    /// Limiter for authenticated endpoints (orders, balances).
    pub fn authenticated_default() -> Self {
        Self::new(90, 1.5)
    }

    /// Consume `weight` tokens without waiting. Returns `false` when the
    /// bucket cannot cover the weight.
    pub fn try_acquire(&self, weight: u32) -> bool {
        self.refill();
        let mut tokens = self.tokens.lock();
        let needed = weight as f64;
        if *tokens >= needed {
            *tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Wait until `weight` tokens are available, then consume them.
    ///
    /// The wait is sized from the token deficit and the refill rate, so
    /// the bound is the bucket arithmetic itself.
    pub async fn acquire(&self, weight: u32) {
        loop {
            if self.try_acquire(weight) {
                return;
            }
            let deficit = {
                let tokens = self.tokens.lock();
                weight as f64 - *tokens
            };
            let wait = if deficit > 0.0 && self.refill_rate > 0.0 {
                Duration::from_secs_f64((deficit / self.refill_rate).min(0.25))
            } else {
                Duration::from_millis(5)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available, truncated.
    pub fn available_tokens(&self) -> u32 {
        self.refill();
        *self.tokens.lock() as u32
    }

    fn refill(&self) {
        let mut last = self.last_refill.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(*last).as_secs_f64();
        if elapsed > 0.0 {
            let mut tokens = self.tokens.lock();
            *tokens = (*tokens + elapsed * self.refill_rate).min(self.max_tokens as f64);
            *last = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_full() {
        let rl = RateLimiter::new(60, 1.0);
        assert_eq!(rl.available_tokens(), 60);
    }

    #[test]
    fn test_try_acquire_consumes() {
        let rl = RateLimiter::new(60, 0.0);
        assert!(rl.try_acquire(40));
        assert_eq!(rl.available_tokens(), 20);
        assert!(!rl.try_acquire(30));
        assert_eq!(rl.available_tokens(), 20);
    }

    #[test]
    fn test_refill_over_time() {
        let rl = RateLimiter::new(100, 1000.0);
        assert!(rl.try_acquire(100));
        std::thread::sleep(Duration::from_millis(50));
        let available = rl.available_tokens();
        assert!(available >= 30, "expected >=30, got {available}");
        assert!(available <= 70, "expected <=70, got {available}");
    }

    #[test]
    fn test_burst_ceiling() {
        let rl = RateLimiter::new(50, 1000.0);
        std::thread::sleep(Duration::from_millis(100));
        assert!(rl.available_tokens() <= 50);
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_refilled() {
        let rl = RateLimiter::new(10, 1000.0);
        assert!(rl.try_acquire(10));
        // Must wait for refill rather than failing.
        rl.acquire(5).await;
        assert!(rl.available_tokens() <= 10);
    }

    #[test]
    fn test_defaults_are_distinct() {
        assert_eq!(RateLimiter::public_default().available_tokens(), 60);
        assert_eq!(RateLimiter::authenticated_default().available_tokens(), 90);
    }

    #[test]
    fn test_zero_weight() {
        let rl = RateLimiter::new(10, 1.0);
        assert!(rl.try_acquire(0));
        assert_eq!(rl.available_tokens(), 10);
    }
}
