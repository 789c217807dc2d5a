use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Tokens added back per second.
    pub rate_per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 10.0,
            burst: 5,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, config: &RateLimitConfig) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.rate_per_second).min(config.burst as f64);
        self.last_refill = now;
    }
}

/// Process-wide token bucket guarding request admission.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.burst as f64,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Takes one token if available. Never waits.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock();
        bucket.refill(&self.config);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }
}
