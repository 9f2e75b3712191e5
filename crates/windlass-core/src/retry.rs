//! Retry strategies for failed activities

use serde::{Deserialize, Serialize};

/// Rule deciding whether a failed activity gets another attempt
///
/// The decision builder consults the strategy with the number of failures
/// recorded in the history so far; `should_retry` answers whether one more
/// attempt is within budget. New strategies are new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Re-schedule immediately, up to `retries` additional attempts
    Instant {
        /// Number of re-schedules allowed after the first failure
        retries: u32,
    },
}

impl RetryStrategy {
    /// Instant retry with the given budget
    pub fn instant(retries: u32) -> Self {
        Self::Instant { retries }
    }

    /// Whether to re-schedule after `failures` recorded failures
    pub fn should_retry(&self, failures: u32) -> bool {
        match self {
            Self::Instant { retries } => failures <= *retries,
        }
    }
}
