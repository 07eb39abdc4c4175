// Bounded retry policy for per-job engine failures

use std::time::Duration;

use super::models::FailureKind;

/// Decision returned by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff with a cap. No retries unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Treat a hard timeout like a transient failure
    pub retry_timeouts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            retry_timeouts: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// `attempt` is 1-based: the number of engine calls already made.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if attempt > self.max_retries {
            return RetryDecision::NoRetry;
        }

        let retryable = match kind {
            FailureKind::Transient => true,
            FailureKind::Timeout => self.retry_timeouts,
            FailureKind::Permanent | FailureKind::EngineMissing => false,
        };
        if !retryable {
            return RetryDecision::NoRetry;
        }

        RetryDecision::RetryAfter(self.delay_for(attempt))
    }

    /// base * 2^(attempt-1), capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }
}
