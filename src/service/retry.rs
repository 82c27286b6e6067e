//! Retry with exponential backoff for command service calls

use std::time::Duration;

use crate::Error;

/// Retry policy for unreachable-service failures
///
/// Controls how many times a failed request is retried and how
/// long to wait between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Default backoff with a custom retry count
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Upper bound on the total time spent sleeping between attempts
    #[must_use]
    pub fn max_total_delay(&self) -> Duration {
        self.max_delay.saturating_mul(self.max_retries)
    }
}

/// Whether a failed attempt should be made again
///
/// Only failures to reach the service qualify. Any received status,
/// including a proxy's 502-504, is an answer and is final.
#[must_use]
pub const fn is_retryable(error: &Error) -> bool {
    matches!(error, Error::Unreachable(_))
}

/// Compute the delay before the next retry attempt.
///
/// `min(base_delay * 2^attempt, max_delay)`
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay)
}
