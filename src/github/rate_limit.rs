//! Rate limit information from GitHub API responses.
//!
//! GitHub reports quota state through `x-ratelimit-remaining` and
//! `x-ratelimit-reset` headers on every response, success or failure. The
//! aggregation run keeps the most recently observed values (last write wins)
//! so the serving layer can surface them to clients.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Rate limit state extracted from GitHub response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Remaining requests in the current window.
    pub remaining: u32,
    /// Unix timestamp when the window resets.
    pub reset: u64,
}

impl RateLimitInfo {
    /// Creates a new rate limit info instance.
    #[must_use]
    pub const fn new(remaining: u32, reset: u64) -> Self {
        Self { remaining, reset }
    }

    /// Parses rate limit headers from a response, if both are present.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_u64(headers, "x-ratelimit-remaining")?;
        let reset = header_u64(headers, "x-ratelimit-reset")?;
        Some(Self::new(u32::try_from(remaining).unwrap_or(u32::MAX), reset))
    }

    /// Returns true if the quota is exhausted.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Seconds until the window resets, or 0 when the reset has passed.
    #[must_use]
    pub fn seconds_until_reset(&self) -> u64 {
        self.reset.saturating_sub(now_unix_seconds())
    }
}

/// Returns the current Unix time in whole seconds.
///
/// Falls back to 0 when the system clock predates the epoch, which only
/// happens on badly misconfigured hosts.
#[must_use]
pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Shared accumulator for the most recent rate limit observation.
///
/// Every upstream call records what it saw; readers get the latest value.
/// This is deliberately last-write-wins rather than a minimum: the newest
/// headers describe the current window best.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    latest: Arc<Mutex<Option<RateLimitInfo>>>,
}

impl RateLimitTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation, replacing any previous one.
    pub fn record(&self, info: RateLimitInfo) {
        let mut guard = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(info);
    }

    /// Records whatever the given headers carry, if anything.
    pub fn record_headers(&self, headers: &HeaderMap) {
        if let Some(info) = RateLimitInfo::from_headers(headers) {
            self.record(info);
        }
    }

    /// Returns the most recent observation, if any call has reported one.
    #[must_use]
    pub fn latest(&self) -> Option<RateLimitInfo> {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}
