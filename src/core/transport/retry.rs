//! Retry policy with linear backoff.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts per send. Values below 1 behave as 1.
    pub max_retries: u32,
    /// Deadline for one attempt, connect and write together.
    pub timeout: Duration,
    /// Backoff unit; the delay after attempt `n` is `base_delay * (n + 1)`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_millis(5000),
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after the zero-indexed `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Upper bound on the wall-clock time one `send` can take: every attempt
    /// hitting its deadline plus every backoff sleep between attempts.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.attempts();
        let sleeps = (0..attempts - 1).fold(Duration::ZERO, |acc, attempt| {
            acc.saturating_add(self.backoff(attempt))
        });
        self.timeout.saturating_mul(attempts).saturating_add(sleeps)
    }
}
