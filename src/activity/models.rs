//! Domain value objects for the activity feed.
//!
//! Everything here is rebuilt per aggregation run and serialises to the
//! camelCase JSON contract consumed by the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::GitHubError;

/// Maximum summary length in characters, including the ellipsis.
pub const SUMMARY_MAX_CHARS: usize = 160;

/// Closed set of surfaced activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// An issue was opened.
    IssueOpened,
    /// A pull request was opened.
    PullRequestOpened,
    /// A pull request was reopened.
    PullRequestReopened,
    /// A pull request was closed with a merge.
    PullRequestMerged,
    /// A pull request was closed without merging.
    PullRequestClosed,
    /// A comment on an issue or pull request.
    IssueOrPrComment,
    /// A submitted pull request review.
    PullRequestReview,
    /// A comment on a pull request diff.
    PullRequestReviewComment,
    /// A published release.
    ReleasePublished,
}

/// Review verdict attached to review-kind items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Review approved the changes.
    Approved,
    /// Review requested changes.
    ChangesRequested,
    /// Review left comments without a verdict.
    Commented,
    /// Review was dismissed.
    Dismissed,
}

impl ReviewState {
    /// Parses GitHub's review state strings, case-insensitively.
    #[must_use]
    pub fn parse(state: &str) -> Option<Self> {
        match state.to_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "changes_requested" => Some(Self::ChangesRequested),
            "commented" => Some(Self::Commented),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

/// The user who performed an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityActor {
    /// Login name.
    pub login: String,
    /// Profile permalink.
    pub url: String,
    /// Avatar image URL, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar_url: Option<String>,
}

/// The repository an activity occurred in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRepo {
    /// `owner/repo` name.
    pub name: String,
    /// Repository permalink.
    pub url: String,
}

/// One normalised unit of public activity.
///
/// `url` is the canonical permalink and the dedup key: within one response,
/// URLs are pairwise distinct. Items with neither a usable title nor URL are
/// dropped during normalisation, never emitted with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    /// Stable id, unique per source event (or synthesised).
    pub id: String,
    /// Activity classification.
    pub kind: ActivityKind,
    /// When the activity happened.
    pub created_at: DateTime<Utc>,
    /// Acting user.
    pub actor: ActivityActor,
    /// Repository context.
    pub repo: ActivityRepo,
    /// Human-readable title; never empty.
    pub title: String,
    /// Canonical permalink; the dedup key.
    pub url: String,
    /// Collapsed, truncated body excerpt.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
    /// Review verdict, only for review-kind items.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub review_state: Option<ReviewState>,
}

/// Aggregated feed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    /// Feed owner.
    pub username: String,
    /// Instant of generation, not of the newest item.
    pub generated_at: DateTime<Utc>,
    /// Items, ordered newest `created_at` first.
    pub items: Vec<ActivityItem>,
    /// True when an upstream failure was absorbed after some items were
    /// already collected.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub partial: bool,
    /// First error encountered during a partial run.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_info: Option<GitHubError>,
}

/// Derives a display summary from body text.
///
/// Newlines and runs of whitespace collapse to single spaces; the result is
/// trimmed and truncated to [`SUMMARY_MAX_CHARS`] characters with an
/// ellipsis when cut. Whitespace-only input yields `None`.
#[must_use]
pub fn summarise(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= SUMMARY_MAX_CHARS {
        return Some(collapsed);
    }
    let mut truncated: String = collapsed.chars().take(SUMMARY_MAX_CHARS - 1).collect();
    truncated.push('…');
    Some(truncated)
}
