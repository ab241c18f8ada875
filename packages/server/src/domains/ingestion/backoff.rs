//! Exponential backoff policy for queue-driven retries.

use std::time::Duration;

/// Stateless retry-delay policy: `delay(n) = min(base * 2^n, cap)`.
///
/// `n` is the number of prior failed attempts for a job, supplied by the
/// queue on redelivery. This governs automatic retries of temporary
/// failures; the reclaim sweep runs on its own, slower cadence.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5 * 60),
            cap: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before redelivering a job that has failed `attempt` times.
    /// Doubles per attempt and saturates at the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base.min(self.cap);
        for _ in 0..attempt {
            if delay >= self.cap {
                return self.cap;
            }
            delay = delay.saturating_mul(2).min(self.cap);
        }
        delay
    }
}
