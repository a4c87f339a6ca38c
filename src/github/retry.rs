//! Retry policy for upstream GitHub calls.
//!
//! Only transient failures are retried, under a small fixed budget. Delays
//! follow an exponential schedule with jitter, except when the error carries
//! an explicit wait (a `Retry-After` value or a rate-limit reset): that wait
//! is honoured instead, unless it exceeds a ceiling, in which case the client
//! gives up immediately rather than hanging on a long sleep.

use std::time::Duration;

use rand::Rng;

use super::error::GitHubError;
use super::rate_limit::now_unix_seconds;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration and try again.
    Retry(Duration),
    /// Stop retrying and surface the error.
    GiveUp,
}

/// Tunable retry behaviour for [`UpstreamClient`](super::client::UpstreamClient).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first (default 2).
    pub max_retries: u32,
    /// First backoff delay; doubles each retry.
    pub base_delay: Duration,
    /// Cap on the exponential schedule.
    pub max_delay: Duration,
    /// Longest explicit upstream-requested wait the client will honour.
    pub explicit_wait_ceiling: Duration,
    /// Whether to randomise delays within the schedule.
    pub with_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
            explicit_wait_ceiling: Duration::from_secs(25),
            with_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Decides whether to retry after `attempt` failures (0-based).
    ///
    /// Preference order for the delay: explicit `Retry-After`, then the
    /// rate-limit reset for rate-limit errors, then the exponential schedule.
    /// An explicit wait above [`Self::explicit_wait_ceiling`] means give up:
    /// a quick degraded response beats blocking a caller for minutes.
    #[must_use]
    pub fn decide(&self, attempt: u32, error: &GitHubError) -> RetryDecision {
        if !error.kind.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        if let Some(wait) = explicit_wait(error) {
            if wait > self.explicit_wait_ceiling {
                return RetryDecision::GiveUp;
            }
            return RetryDecision::Retry(wait);
        }

        RetryDecision::Retry(self.backoff_delay(attempt))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms.saturating_mul(1u64 << attempt.min(16)).min(max_ms);

        let delay_ms = if self.with_jitter && capped > base_ms {
            rand::rng().random_range(base_ms..=capped)
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }
}

/// The wait the upstream asked for, when the error carries one.
///
/// Rate-limit resets are converted to a relative wait of at least one second
/// so an already-passed reset still backs off briefly.
fn explicit_wait(error: &GitHubError) -> Option<Duration> {
    if let Some(seconds) = error.retry_after {
        return Some(Duration::from_secs(seconds.max(1)));
    }
    let reset = error.rate_limit_reset?;
    let wait = reset.saturating_sub(now_unix_seconds()).max(1);
    Some(Duration::from_secs(wait))
}
