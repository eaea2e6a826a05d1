//! Client-side request budget for market data providers
//!
//! Token bucket sized to the provider's per-minute allowance. An empty
//! bucket is reported back to the caller instead of waiting.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens (requests) held at once
    capacity: u32,
    /// Current available tokens
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket allowing `requests_per_minute` requests, starting full
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            capacity: requests_per_minute,
            tokens: requests_per_minute as f64,
            refill_rate: requests_per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Try to consume a token, returns true if allowed
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Get time until a token will be available
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

/// Shared limiter handed to a provider
#[derive(Debug)]
pub struct RequestBudget {
    bucket: Mutex<TokenBucket>,
}

impl RequestBudget {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::per_minute(requests_per_minute)),
        }
    }

    /// Take one request from the budget, or report how long until one frees up
    pub fn acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        if bucket.try_acquire() {
            Ok(())
        } else {
            Err(bucket.time_until_available())
        }
    }
}
