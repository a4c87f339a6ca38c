//! Error types exposed by the GitHub upstream layer.
//!
//! Upstream failures are reduced to a closed [`GitHubErrorKind`] taxonomy so
//! that callers branch on kind rather than inspecting transport errors. The
//! full [`GitHubError`] carries the diagnostic context GitHub supplies
//! (status, retry-after, rate-limit reset, request id) and serialises into
//! JSON failure bodies.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest message retained on an error; upstream bodies can be large and
/// callers only ever surface a truncated summary.
const MAX_MESSAGE_LEN: usize = 200;

/// Closed classification of upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitHubErrorKind {
    /// Primary or secondary rate limit exhausted (403 with a rate-limit
    /// message, or 429).
    RateLimit,
    /// Credentials rejected (401).
    Unauthorized,
    /// Access denied for reasons other than rate limiting (403).
    Forbidden,
    /// Resource does not exist (404).
    NotFound,
    /// Request rejected as invalid (422).
    Validation,
    /// Upstream server failure (5xx).
    Server,
    /// Transport failure that was not a timeout.
    Network,
    /// The bounded per-call timeout elapsed.
    Timeout,
    /// Anything that does not fit the above, including parse failures.
    Unknown,
}

impl GitHubErrorKind {
    /// Returns true for the transient kinds the client retries locally.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Server | Self::RateLimit
        )
    }

    /// Stable snake_case name, matching the serialised form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Server => "server",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GitHubErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified upstream failure with whatever diagnostics GitHub supplied.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("GitHub request failed ({kind}): {message}")]
#[serde(rename_all = "camelCase")]
pub struct GitHubError {
    /// Failure classification.
    pub kind: GitHubErrorKind,
    /// HTTP status, when a response was received.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u16>,
    /// Explicit `Retry-After` value in seconds, when sent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after: Option<u64>,
    /// Unix timestamp at which the rate limit window resets, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rate_limit_reset: Option<u64>,
    /// GitHub request id (`x-github-request-id`), when present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    /// Truncated human-readable detail.
    pub message: String,
}

impl GitHubError {
    /// Creates an error of the given kind, truncating the message.
    #[must_use]
    pub fn new(kind: GitHubErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            retry_after: None,
            rate_limit_reset: None,
            request_id: None,
            message: truncate_message(message.into()),
        }
    }

    /// Attaches the HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches an explicit retry-after delay in seconds.
    #[must_use]
    pub const fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    /// Attaches the rate-limit reset timestamp.
    #[must_use]
    pub const fn with_rate_limit_reset(mut self, reset: Option<u64>) -> Self {
        self.rate_limit_reset = reset;
        self
    }

    /// Attaches the upstream request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// True when this is GitHub's "pagination is limited for this resource"
    /// validation response, which the event source treats as a clean end of
    /// stream rather than a failure.
    #[must_use]
    pub fn is_pagination_limited(&self) -> bool {
        self.kind == GitHubErrorKind::Validation
            && self.message.to_lowercase().contains("pagination is limited")
    }
}

/// Classifies a non-2xx response from its status and body message.
///
/// A 403 counts as a rate limit only when the message says so; GitHub uses
/// the same status for ordinary permission failures.
#[must_use]
pub fn classify_status(status: u16, message: &str) -> GitHubErrorKind {
    let lowered = message.to_lowercase();
    match status {
        401 => GitHubErrorKind::Unauthorized,
        403 if lowered.contains("rate limit") => GitHubErrorKind::RateLimit,
        403 => GitHubErrorKind::Forbidden,
        404 => GitHubErrorKind::NotFound,
        422 => GitHubErrorKind::Validation,
        429 => GitHubErrorKind::RateLimit,
        500.. => GitHubErrorKind::Server,
        _ => GitHubErrorKind::Unknown,
    }
}

fn truncate_message(message: String) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message;
    }
    message.chars().take(MAX_MESSAGE_LEN).collect()
}
