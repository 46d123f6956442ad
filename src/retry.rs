use std::time::Duration;

/// Bounded exponential backoff used for partial batch responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of requests, the first one included.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    /// The same delay before every retry.
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
        }
    }

    /// Delay before retry number `retry` (0-based): `initial * 2^retry`, capped.
    pub fn delay_for(&self, retry: usize) -> Duration {
        let factor = u32::try_from(retry)
            .ok()
            .and_then(|r| 2u32.checked_pow(r))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..).map(move |retry| self.delay_for(retry))
    }
}
