//! Upstream GitHub API access.
//!
//! This module owns everything that talks to GitHub: the retrying HTTP
//! client, the closed error taxonomy, rate-limit bookkeeping, the paginated
//! events source, and the raw deserialisation models. Errors are mapped into
//! [`GitHubError`] so callers can branch on kind without seeing transport
//! internals.

pub mod client;
pub mod error;
pub mod events;
pub mod models;
pub mod rate_limit;
pub mod retry;

pub use client::{UpstreamClient, UpstreamClientConfig, UpstreamResponse};
pub use error::{GitHubError, GitHubErrorKind};
pub use events::{EventPage, EventSource, GITHUB_API_BASE};
pub use models::{ApiEvent, ApiUserProfile, PullRequestDetail};
pub use rate_limit::{RateLimitInfo, RateLimitTracker};
pub use retry::{RetryDecision, RetryPolicy};
