use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket refilled continuously at `per_second` tokens per second.
pub struct RateLimiter {
    state: Mutex<Bucket>,
    capacity: u32,
    refill_every: Duration,
}

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Returns `None` when `per_second` is zero (rate limiting disabled).
    pub fn per_second(per_second: u32) -> Option<Self> {
        if per_second == 0 {
            return None;
        }
        Some(Self {
            state: Mutex::new(Bucket {
                tokens: per_second,
                last_refill: Instant::now(),
            }),
            capacity: per_second,
            refill_every: Duration::from_secs(1) / per_second,
        })
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        loop {
            {
                let mut bucket = self.state.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    return;
                }
            }
            tokio::time::sleep(self.refill_every).await;
        }
    }

    /// Takes a token if one is available without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.state.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed();
        let earned = (elapsed.as_nanos() / self.refill_every.as_nanos().max(1)) as u64;
        if earned == 0 {
            return;
        }
        let tokens = bucket.tokens as u64 + earned;
        if tokens >= self.capacity as u64 {
            bucket.tokens = self.capacity;
            bucket.last_refill = Instant::now();
        } else {
            // Keep the partial interval so steady load sees the full rate.
            bucket.tokens = tokens as u32;
            bucket.last_refill += self.refill_every * earned as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables() {
        assert!(RateLimiter::per_second(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_drains_and_refills() {
        let limiter = RateLimiter::per_second(2).unwrap();
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_interval_carries_over() {
        let limiter = RateLimiter::per_second(2).unwrap();
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(700)).await;
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        // 700ms + 300ms is two full intervals since the bucket drained.
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::per_second(1).unwrap();
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
