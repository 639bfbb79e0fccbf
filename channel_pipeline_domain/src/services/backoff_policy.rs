// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Exponential backoff with jitter for transient Stage Driver failures
//! (§4.6: "exponential backoff + jitter; bump an attempt counter; respect
//! a per-stage attempt cap (default 5)"). The exact curve is left open by
//! the distilled spec; ours: `base * 2^attempt + jitter(0..=base)`, capped
//! at 300s.

use chrono::Duration;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 5,
            max_delay_secs: 300,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn has_attempts_remaining(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Delay before the next attempt, given how many attempts have
    /// already been made (0-indexed: the first failure passes 0).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unjittered = self.base_delay_secs.saturating_mul(1u64 << attempt.min(20));
        let capped = unjittered.min(self.max_delay_secs);
        let jitter = rand::rng().random_range(0..=self.base_delay_secs);
        Duration::seconds((capped + jitter).min(self.max_delay_secs) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_then_caps() {
        let policy = BackoffPolicy::default();
        for attempt in 0..10 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay.num_seconds() <= policy.max_delay_secs as i64);
            assert!(delay.num_seconds() >= 0);
        }
    }

    #[test]
    fn attempt_cap_is_five_by_default() {
        let policy = BackoffPolicy::default();
        assert!(policy.has_attempts_remaining(4));
        assert!(!policy.has_attempts_remaining(5));
    }
}
