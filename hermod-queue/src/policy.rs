//! When a pending recipient is tried again, and when the queue stops trying

use std::time::{Duration, SystemTime};

use serde::Deserialize;

use crate::queue::retry::calculate_next_retry_time;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first retryable failure, doubled for each further one.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::base_retry_delay_secs")]
    pub base_retry_delay_secs: u64,

    /// Cap on the backoff.
    ///
    /// Default: 1200 seconds (20 minutes)
    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Delays are randomized within ±`retry_jitter_factor`.
    ///
    /// Default: 0.1 (±10%)
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,

    /// Optional limit on attempts per recipient. Once reached, a retryable
    /// failure is treated as permanent.
    ///
    /// Default: no limit, only `give_up_after_secs` applies
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Age after which an item's remaining recipients are failed.
    ///
    /// Default: 72000 seconds (20 hours)
    #[serde(default = "defaults::give_up_after_secs")]
    pub give_up_after_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_retry_delay_secs: defaults::base_retry_delay_secs(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
            max_attempts: None,
            give_up_after_secs: defaults::give_up_after_secs(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recipient that has failed `attempts` times may be tried again
    #[must_use]
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }

    /// When to try again after `attempts` failures, counted from `now`
    #[must_use]
    pub fn calculate_next_retry(&self, attempts: u32, now: SystemTime) -> SystemTime {
        calculate_next_retry_time(
            attempts,
            self.base_retry_delay_secs,
            self.max_retry_delay_secs,
            self.retry_jitter_factor,
            now,
        )
    }

    #[must_use]
    pub const fn give_up_after(&self) -> Duration {
        Duration::from_secs(self.give_up_after_secs)
    }

    /// Whether an item created at `created_at` has outlived its retry budget
    #[must_use]
    pub fn is_expired(&self, created_at: SystemTime, now: SystemTime) -> bool {
        now.duration_since(created_at)
            .is_ok_and(|age| age > self.give_up_after())
    }
}

mod defaults {
    pub const fn base_retry_delay_secs() -> u64 {
        60
    }

    pub const fn max_retry_delay_secs() -> u64 {
        1200
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.1
    }

    pub const fn give_up_after_secs() -> u64 {
        72_000
    }
}
