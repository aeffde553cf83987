//! Reconnect backoff: exponential growth, capped, with jitter.

use crate::config::ReconnectPolicy;
use rand::Rng;
use std::cmp;
use std::time::Duration;

/// Delay before retry number `attempt` (0-based), before jitter.
fn ceiling_ms(policy: &ReconnectPolicy, attempt: u32) -> u64 {
    let initial = policy.initial_delay_ms.max(1) as f64;
    let multiplier = policy.multiplier.max(1.0);
    let grown = initial * multiplier.powi(attempt.min(64) as i32);
    let capped = if grown.is_finite() {
        grown.min(policy.max_delay_ms as f64)
    } else {
        policy.max_delay_ms as f64
    };
    cmp::max(capped as u64, 1)
}

/// Half the ceiling is fixed, the other half is scaled by `jitter` in `[0, 1]`.
fn compute_delay(policy: &ReconnectPolicy, attempt: u32, jitter: f64) -> Duration {
    let ceiling = ceiling_ms(policy, attempt);
    let half = ceiling / 2;
    let spread = ((ceiling - half) as f64 * jitter.clamp(0.0, 1.0)) as u64;
    Duration::from_millis(half + spread)
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the attempt cap is hit.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        let jitter = rand::thread_rng().gen_range(0.0..=1.0);
        let delay = compute_delay(&self.policy, self.attempts, jitter);
        self.attempts = self.attempts.saturating_add(1);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
