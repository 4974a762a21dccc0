//! # Retry Backoff
//!
//! Delay schedule for queued actions that failed with a transient error.
//! Retries are unlimited: the queue is store-and-forward, so an action keeps
//! waiting for as long as the backend stays unreachable.
//!
//! ## Usage
//!
//! ```rust
//! use estate_sync::offline::retry::BackoffStrategy;
//! use std::time::Duration;
//!
//! let backoff = BackoffStrategy::default();
//! assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
//! assert_eq!(backoff.delay_for(30), Duration::from_secs(60));
//! ```

use crate::shared::config::{AppConfig, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS};
use std::time::Duration;

/// Doubling retry delay, capped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStrategy {
    /// Delay before the first retry, in milliseconds
    pub base_ms: u64,
    /// Upper bound on any delay, in milliseconds
    pub cap_ms: u64,
}

impl BackoffStrategy {
    /// Strategy from the configured base and cap
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            cap_ms: config.backoff_cap_ms,
        }
    }

    /// Delay before retry number `retry_count` (1 for the first retry)
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(63);
        Duration::from_millis(self.base_ms.saturating_mul(1u64 << exponent).min(self.cap_ms))
    }

    /// Epoch millis at which retry number `retry_count` becomes due
    pub fn next_attempt_at(&self, now_ms: i64, retry_count: u32) -> i64 {
        let delay = i64::try_from(self.delay_for(retry_count).as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay)
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}
