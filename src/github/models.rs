//! Deserialisation targets for GitHub API payloads.
//!
//! Types prefixed with `Api` mirror the wire shape of the REST API. Event
//! payloads are trimmed by GitHub, so almost every field is optional; the
//! normaliser decides what is usable. `PullRequestDetail` is the converted
//! domain type produced by the pull-request resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw entry from `/users/{username}/events/public`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEvent {
    /// Upstream event id.
    pub id: Option<String>,
    /// Event type name, e.g. `IssuesEvent`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Acting user.
    pub actor: Option<ApiActor>,
    /// Repository the event occurred in.
    pub repo: Option<ApiRepoRef>,
    /// Type-specific payload; trimmed relative to the full resources.
    #[serde(default)]
    pub payload: ApiEventPayload,
    /// Event creation time.
    pub created_at: Option<DateTime<Utc>>,
}

/// Event actor as embedded in the events feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiActor {
    /// Login name.
    pub login: Option<String>,
    /// API URL for the actor.
    pub url: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
}

/// Repository reference as embedded in the events feed.
///
/// `name` is the `owner/repo` pair and `url` the repository's API URL, which
/// doubles as the fork-resolver key.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRepoRef {
    /// `owner/repo` name.
    pub name: Option<String>,
    /// Repository API URL.
    pub url: Option<String>,
}

/// Union of the payload fields the normaliser reads, across event types.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEventPayload {
    /// Event action, e.g. `opened`, `created`, `published`.
    pub action: Option<String>,
    /// Pull request number for `PullRequestEvent`s.
    pub number: Option<u64>,
    /// Issue resource for issue and comment events.
    pub issue: Option<ApiIssue>,
    /// Pull request resource for PR, review, and review-comment events.
    pub pull_request: Option<ApiPullRequestRef>,
    /// Comment resource for comment events.
    pub comment: Option<ApiComment>,
    /// Review resource for review events.
    pub review: Option<ApiReview>,
    /// Release resource for release events.
    pub release: Option<ApiRelease>,
}

/// Issue fields used for normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssue {
    /// Issue number.
    pub number: Option<u64>,
    /// Issue title.
    pub title: Option<String>,
    /// Permalink.
    pub html_url: Option<String>,
    /// Issue body.
    pub body: Option<String>,
}

/// Pull request fields as they appear inside event payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPullRequestRef {
    /// Pull request number.
    pub number: Option<u64>,
    /// Title, frequently absent from trimmed payloads.
    pub title: Option<String>,
    /// Permalink.
    pub html_url: Option<String>,
    /// API URL, used as the enrichment key.
    pub url: Option<String>,
    /// Body text.
    pub body: Option<String>,
    /// Merged flag; absent from trimmed payloads.
    pub merged: Option<bool>,
    /// Merge timestamp; non-null means merged.
    pub merged_at: Option<String>,
}

/// Comment fields used for normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiComment {
    /// Permalink.
    pub html_url: Option<String>,
    /// Comment body.
    pub body: Option<String>,
}

/// Review fields used for normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiReview {
    /// Review state, e.g. `approved`, `commented`.
    pub state: Option<String>,
    /// Permalink.
    pub html_url: Option<String>,
    /// Review body.
    pub body: Option<String>,
}

/// Release fields used for normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRelease {
    /// Release display name.
    pub name: Option<String>,
    /// Git tag.
    pub tag_name: Option<String>,
    /// Permalink.
    pub html_url: Option<String>,
    /// Release notes.
    pub body: Option<String>,
}

/// Repository resource from `/repos/{owner}/{repo}`; only the fork flag is
/// consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRepository {
    /// Whether the repository is a fork.
    #[serde(default)]
    pub fork: bool,
}

/// Full pull request resource from `/repos/{owner}/{repo}/pulls/{n}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPullRequest {
    /// Pull request number.
    pub number: Option<u64>,
    /// Title.
    pub title: Option<String>,
    /// Permalink.
    pub html_url: Option<String>,
    /// Body text.
    pub body: Option<String>,
    /// Merged flag.
    pub merged: Option<bool>,
    /// Merge timestamp.
    pub merged_at: Option<String>,
}

/// Resolved pull request detail used to fill trimmed event payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetail {
    /// Pull request number.
    pub number: Option<u64>,
    /// Title.
    pub title: Option<String>,
    /// Permalink.
    pub html_url: Option<String>,
    /// Body text.
    pub body: Option<String>,
    /// Whether the pull request was merged.
    pub merged: bool,
}

impl From<ApiPullRequest> for PullRequestDetail {
    fn from(value: ApiPullRequest) -> Self {
        Self {
            number: value.number,
            title: value.title,
            html_url: value.html_url,
            body: value.body,
            merged: value.merged.unwrap_or(false) || value.merged_at.is_some(),
        }
    }
}

/// User profile from `/users/{username}`, trimmed to presentation needs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiUserProfile {
    /// Login name.
    pub login: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// Profile permalink.
    pub html_url: Option<String>,
    /// Profile bio.
    pub bio: Option<String>,
    /// Public repository count.
    pub public_repos: Option<u64>,
    /// Follower count.
    pub followers: Option<u64>,
}
