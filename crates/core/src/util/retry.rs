//! Bounded waiting on remote rate-limit directives
//!
//! Remote services that answer "retry after N seconds" are honoured, but only
//! up to a fixed number of retries and a fixed total wait. Exhausting either
//! limit is reported to the caller instead of waiting forever.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 10;
pub const DEFAULT_MAX_RATE_LIMIT_WAIT_SECS: u64 = 120;

/// Configuration for rate-limit retry behavior
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retransmissions after the first request
    pub max_retries: u32,
    /// Maximum accumulated sleep across all retries of one request
    pub max_total_wait: Duration,
    /// Added on top of the server-provided delay
    pub padding: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            max_total_wait: Duration::from_secs(DEFAULT_MAX_RATE_LIMIT_WAIT_SECS),
            padding: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom limits
    pub fn new(max_retries: u32, max_total_wait: Duration) -> Self {
        Self {
            max_retries,
            max_total_wait,
            ..Default::default()
        }
    }

    /// Delay to honour for a `retryAfter` value in seconds
    pub fn delay_for(&self, retry_after_secs: f64) -> Duration {
        let secs = if retry_after_secs.is_finite() {
            retry_after_secs.max(0.0)
        } else {
            0.0
        };
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .saturating_add(self.padding)
    }

    pub fn budget(&self) -> RetryBudget<'_> {
        RetryBudget {
            policy: self,
            retries: 0,
            waited: Duration::ZERO,
        }
    }
}

/// Retry accounting for a single logical request
#[derive(Debug)]
pub struct RetryBudget<'a> {
    policy: &'a RetryPolicy,
    retries: u32,
    waited: Duration,
}

impl RetryBudget<'_> {
    /// Reserve the next retry. Returns the delay to sleep, or `None` once the
    /// retry count or the total wait would exceed the policy.
    pub fn next_delay(&mut self, retry_after_secs: f64) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        let delay = self.policy.delay_for(retry_after_secs);
        let waited = self.waited.checked_add(delay)?;
        if waited > self.policy.max_total_wait {
            return None;
        }
        self.retries += 1;
        self.waited = waited;
        Some(delay)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn waited(&self) -> Duration {
        self.waited
    }
}
