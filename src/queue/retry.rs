//! Retry policy: decides backoff delays between deliveries.

use std::time::Duration;

use crate::models::QueueConfig;

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: config.min_backoff(),
            max_delay: config.max_backoff(),
            multiplier: 2.0,
        }
    }

    /// Same growth and ceiling, starting from a task's own minimum backoff.
    pub fn with_base(&self, base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..self.clone()
        }
    }

    /// Delay before the next delivery, given the attempts already made.
    ///
    /// `base_delay * multiplier^(attempts - 1)`, capped at `max_delay` but
    /// never below `base_delay`. With base 2s and multiplier 2.0 that gives
    /// 2s, 4s, 8s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_delay)
            .max(self.base_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
