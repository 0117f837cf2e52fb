// ABOUTME: Exponential backoff used by chat transports between reconnect attempts.
// ABOUTME: Delays double from the initial value up to a cap; a successful login resets them.

use std::time::Duration;

/// Delay schedule for reconnecting a dropped chat connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Give up after this many consecutive failed attempts (0 = never)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

/// Running reconnect state for a single transport
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            next_delay: policy.initial_delay,
        }
    }

    /// Forget previous failures after the connection is re-established
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_delay = self.policy.initial_delay;
    }

    /// Delay to wait before the next attempt, or None once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.policy.max_attempts > 0 && self.attempts > self.policy.max_attempts {
            return None;
        }

        let delay = self.next_delay;
        self.next_delay = std::cmp::min(self.next_delay.saturating_mul(2), self.policy.max_delay);
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
