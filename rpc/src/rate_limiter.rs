//! Per-endpoint token-bucket rate limiter
//!
//! Classic lazy-refill bucket: tokens accrue continuously at the refill
//! rate, clamped at capacity. `acquire` never blocks; a denied caller gets
//! the wait that would make the request admissible and decides for itself
//! whether to sleep or move on to the next endpoint.

use crate::endpoint::RateLimitConfig;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Outcome of an admission request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    /// Not enough tokens; retry after the given delay
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Non-blocking token bucket
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Bucket starts full
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst as f64;
        Self {
            capacity,
            refill_per_sec: config.requests_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Try to take `n` tokens
    pub fn acquire(&self, n: u32) -> Admission {
        let needed = n as f64;
        let mut state = self.state.lock();

        let elapsed = state.last_refill.elapsed();
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .min(self.capacity);
        state.last_refill = Instant::now();

        if state.tokens >= needed {
            state.tokens -= needed;
            Admission::Admitted
        } else {
            let deficit = needed - state.tokens;
            Admission::Denied {
                retry_after: Duration::from_secs_f64(deficit / self.refill_per_sec),
            }
        }
    }

    /// Tokens currently available (after a refill pass)
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        let elapsed = state.last_refill.elapsed();
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .min(self.capacity);
        state.last_refill = Instant::now();
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(rps: f64, burst: u32) -> TokenBucket {
        TokenBucket::new(RateLimitConfig {
            requests_per_second: rps,
            burst,
        })
    }

    #[test]
    fn test_starts_full() {
        let limiter = bucket(1.0, 2);
        assert_eq!(limiter.acquire(1), Admission::Admitted);
        assert_eq!(limiter.acquire(1), Admission::Admitted);
    }

    #[test]
    fn test_denies_with_retry_after() {
        let limiter = bucket(1.0, 2);
        limiter.acquire(1);
        limiter.acquire(1);

        match limiter.acquire(1) {
            Admission::Denied { retry_after } => {
                // One token at 1/s: roughly a second away
                assert!(retry_after > Duration::from_millis(900));
                assert!(retry_after <= Duration::from_millis(1100));
            }
            Admission::Admitted => panic!("bucket should be empty"),
        }
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = bucket(100.0, 2);
        limiter.acquire(2);
        assert!(!limiter.acquire(1).is_admitted());

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.acquire(1), Admission::Admitted);
    }

    #[test]
    fn test_clamps_at_capacity() {
        let limiter = bucket(1000.0, 5);
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.available() <= 5.0);
    }

    #[test]
    fn test_tokens_never_negative() {
        let limiter = bucket(1.0, 1);
        limiter.acquire(1);
        assert!(!limiter.acquire(1).is_admitted());
        let available = limiter.available();
        assert!((0.0..=1.0).contains(&available));
    }

    #[test]
    fn test_multi_token_acquire() {
        let limiter = bucket(10.0, 10);
        assert_eq!(limiter.acquire(8), Admission::Admitted);
        assert!(!limiter.acquire(5).is_admitted());
        assert_eq!(limiter.acquire(2), Admission::Admitted);
    }
}
