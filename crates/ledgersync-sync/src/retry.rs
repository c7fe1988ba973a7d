//! Backoff for failed operations
//!
//! After the n-th consecutive failure an operation waits
//! `min(base * 2^(n-1), max)` before the engine replays it again.
//! A zero base delay disables backoff entirely.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ledgersync_core::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Replays failed operations on every pass
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay())
    }

    pub fn is_enabled(&self) -> bool {
        !self.base.is_zero()
    }

    /// Delay after `retry_count` consecutive failures
    pub fn delay_for(&self, retry_count: u32) -> Option<Duration> {
        if !self.is_enabled() || retry_count == 0 {
            return None;
        }
        let factor = 1u32.checked_shl(retry_count - 1).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.max))
    }

    /// Earliest replay time after `retry_count` failures, measured from `now`
    pub fn next_attempt_at(&self, retry_count: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = self.delay_for(retry_count)?;
        let delay = chrono::Duration::from_std(delay).ok()?;
        now.checked_add_signed(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
