//! Token-bucket admission control on mutating tool invocations. One bucket
//! per server process; reads (list, search, check) never consult it.

use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// A token bucket rate limiter, cheaply cloneable (shares one bucket).
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// `burst` is the bucket capacity; `rate_per_minute` is the refill rate.
    #[must_use]
    pub fn new(burst: u32, rate_per_minute: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                capacity: f64::from(burst),
                refill_per_sec: f64::from(rate_per_minute) / 60.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempt to consume one token. Returns `true` if admitted.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter bucket poisoned");
        bucket.refill();
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_burst_then_denies() {
        let limiter = RateLimiter::new(3, 60);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1, 60 * 60);
        assert!(limiter.allow());
        assert!(!limiter.allow());
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(limiter.allow());
    }
}
