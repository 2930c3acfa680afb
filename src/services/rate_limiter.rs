//! Token-bucket limiter for outbound provider calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Admits at most `burst` calls at once and refills `refill_per_sec` tokens
/// per second. A limiter built with a rate of zero admits everything.
#[derive(Debug)]
pub struct RateLimiter {
    refill_per_sec: f64,
    capacity: f64,
    bucket: Option<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        if refill_per_sec <= 0.0 || burst == 0 {
            return Self::unlimited();
        }
        let capacity = f64::from(burst);
        Self {
            refill_per_sec,
            capacity,
            bucket: Some(Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            refill_per_sec: 0.0,
            capacity: 0.0,
            bucket: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Wait for a token. Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let Some(bucket) = &self.bucket else {
            return Duration::ZERO;
        };

        let started = Instant::now();
        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return started.elapsed();
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let Some(bucket) = &self.bucket else {
            return true;
        };
        let mut bucket = bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_waits_for_refill() {
        let limiter = RateLimiter::new(1.0, 2);

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert!(!limiter.try_acquire().await);

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(10.0, 3);
        tokio::time::advance(Duration::from_secs(60)).await;

        for _ in 0..3 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_zero_rate_disables_limiting() {
        let limiter = RateLimiter::new(0.0, 5);
        assert!(!limiter.is_enabled());
        for _ in 0..100 {
            assert!(limiter.try_acquire().await);
        }
    }
}
