//! Cache freshness policy.
//!
//! Age is classified against two windows: entries within `max_age` are
//! fresh and served as-is; entries within the stale-while-revalidate window
//! beyond that are served immediately while a background refresh runs.
//! Anything older (or of unknown age) is expired; the edge cache still
//! serves an expired-but-present entry stale and only refreshes inline
//! when no entry exists at all.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default freshness window.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// Default stale-while-revalidate window beyond the freshness window.
pub const DEFAULT_STALE_WHILE_REVALIDATE: Duration = Duration::from_secs(300);

/// Classification of a cached entry's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within the freshness window; serve without refreshing.
    Fresh,
    /// Past freshness but within the revalidation window; serve and refresh
    /// in the background.
    Stale,
    /// Too old to serve, or of unknown age; refresh before serving.
    Expired,
}

/// Freshness windows for one cached endpoint.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// Window during which an entry is served without revalidation.
    pub max_age: Duration,
    /// Additional window during which a stale entry is still served.
    pub stale_while_revalidate: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            stale_while_revalidate: DEFAULT_STALE_WHILE_REVALIDATE,
        }
    }
}

impl CachePolicy {
    /// Classifies an entry generated at `generated_at`, as seen at `now`.
    ///
    /// A `generated_at` in the future counts as age zero rather than
    /// underflowing.
    #[must_use]
    pub fn classify(&self, generated_at: DateTime<Utc>, now: DateTime<Utc>) -> Freshness {
        let age_ms = now
            .signed_duration_since(generated_at)
            .num_milliseconds()
            .max(0);
        let Ok(age_ms) = u128::try_from(age_ms) else {
            return Freshness::Expired;
        };

        if age_ms <= self.max_age.as_millis() {
            Freshness::Fresh
        } else if age_ms <= self.max_age.as_millis() + self.stale_while_revalidate.as_millis() {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// `max-age` in whole seconds, for response headers.
    #[must_use]
    pub fn max_age_seconds(&self) -> u64 {
        self.max_age.as_secs()
    }

    /// `stale-while-revalidate` in whole seconds, for response headers.
    #[must_use]
    pub fn stale_while_revalidate_seconds(&self) -> u64 {
        self.stale_while_revalidate.as_secs()
    }
}
