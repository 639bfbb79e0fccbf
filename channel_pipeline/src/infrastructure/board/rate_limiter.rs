// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Board Rate Limiter
//!
//! The external board enforces a hard 3 req/s limit (§6.2); bursts (a
//! batch of 20 pages queued at once) must be smoothed rather than
//! rejected. A small async token bucket, shared across the outbound and
//! inbound loops via one `Arc`, does the smoothing: `acquire()` blocks
//! until a token is available rather than failing, since §4.7's contract
//! requires every queued write to eventually land, just later.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Seconds to wait before one token is available, or zero if one
    /// already is.
    fn wait_time(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
        }
    }
}

/// Shared, cloneable rate limiter. `3 req/s, burst 3` per §4.7's
/// "[AMBIENT] HTTP client & rate limiter" note.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_sec: f64, burst: f64) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(TokenBucket::new(burst, requests_per_sec))),
        }
    }

    pub fn board_default() -> Self {
        Self::new(3.0, 3.0)
    }

    /// Waits, if necessary, until a token is available, then consumes one.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                bucket.wait_time()
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_capacity_is_immediately_available() {
        let limiter = RateLimiter::new(3.0, 3.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exceeding_burst_waits_for_refill() {
        let limiter = RateLimiter::new(10.0, 1.0);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
