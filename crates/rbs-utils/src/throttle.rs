use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Token-bucket byte-rate limiter.
///
/// Tokens refill continuously at the configured rate and cap at one second
/// of credit, so a quiet period buys at most one second of burst.
/// [`Throttle::acquire`] blocks the calling thread until the requested
/// tokens are available. A rate of zero disables limiting entirely.
pub struct Throttle {
    bucket: Mutex<Bucket>,
}

struct Bucket {
    /// Bytes per second. Zero means unlimited.
    rate: u64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate as f64).min(self.rate as f64);
        self.last_refill = now;
    }
}

impl Throttle {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                rate: bytes_per_sec,
                tokens: bytes_per_sec as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Replace the rate. Accumulated credit is clamped to the new bucket size.
    pub fn set_rate(&self, bytes_per_sec: u64) {
        let mut bucket = self.bucket.lock();
        bucket.rate = bytes_per_sec;
        bucket.tokens = bucket.tokens.min(bytes_per_sec as f64);
        bucket.last_refill = Instant::now();
    }

    pub fn rate(&self) -> u64 {
        self.bucket.lock().rate
    }

    /// Block until `bytes` tokens are available, then consume them.
    ///
    /// A request larger than the bucket is clamped to the bucket size, so it
    /// costs one full second of credit rather than deadlocking.
    pub fn acquire(&self, bytes: u64) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                if bucket.rate == 0 {
                    return;
                }
                bucket.refill();
                let need = (bytes as f64).min(bucket.rate as f64);
                if bucket.tokens >= need {
                    bucket.tokens -= need;
                    return;
                }
                Duration::from_secs_f64((need - bucket.tokens) / bucket.rate as f64)
            };
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_never_blocks() {
        let throttle = Throttle::new(0);
        let start = Instant::now();
        for _ in 0..1000 {
            throttle.acquire(1 << 20);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_initial_credit_is_one_bucket() {
        let throttle = Throttle::new(4096);
        let start = Instant::now();
        throttle.acquire(4096);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_acquire_blocks_until_refilled() {
        let throttle = Throttle::new(1000);
        throttle.acquire(1000); // drain the initial credit

        let start = Instant::now();
        throttle.acquire(500);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed = {:?}", elapsed);
    }

    #[test]
    fn test_oversized_request_is_clamped() {
        let throttle = Throttle::new(1000);
        let start = Instant::now();
        // Larger than the bucket: costs one bucket, must not hang.
        throttle.acquire(1 << 30);
        throttle.acquire(1 << 30);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_set_rate_clamps_credit() {
        let throttle = Throttle::new(1 << 20);
        throttle.set_rate(100);
        assert_eq!(throttle.rate(), 100);

        throttle.acquire(100); // at most one bucket of credit survives
        let start = Instant::now();
        throttle.acquire(50);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
