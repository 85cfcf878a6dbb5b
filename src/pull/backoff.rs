//! Reconnect back-off

use std::time::Duration;

use super::PullError;

/// Exponential delay between pull attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Result<Self, PullError> {
        if multiplier <= 1.0 || !multiplier.is_finite() {
            return Err(PullError::InvalidBackoffMultiplier);
        }

        Ok(Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::from_secs_f64(current.as_secs_f64() * self.multiplier);
        next.min(self.max_delay)
    }

    /// A run that stayed up longer than the max delay counts as healthy
    pub fn should_reset(&self, uptime: Duration) -> bool {
        uptime > self.max_delay
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}
