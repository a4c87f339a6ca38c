//! Mapping from raw GitHub events to canonical activity items.
//!
//! `normalise` is a pure function: one raw event (plus any resolved
//! pull-request detail) maps to zero or one [`ActivityItem`]. Unsupported
//! event types, unqualifying actions, and events without a usable title and
//! permalink are dropped rather than emitted with placeholders. Push and
//! commit noise is excluded by design: the feed is what the user said and
//! shipped.

use crate::github::models::{ApiEvent, ApiEventPayload};
use crate::github::PullRequestDetail;

use super::models::{
    ActivityActor, ActivityItem, ActivityKind, ActivityRepo, ReviewState, summarise,
};

/// Normalises one raw event into at most one activity item.
#[must_use]
pub fn normalise(event: &ApiEvent, detail: Option<&PullRequestDetail>) -> Option<ActivityItem> {
    let kind = event.kind.as_deref()?;
    let created_at = event.created_at?;

    let actor = event.actor.as_ref()?;
    let login = non_empty(actor.login.as_deref())?;
    let actor = ActivityActor {
        login: login.to_owned(),
        url: format!("https://github.com/{login}"),
        avatar_url: actor.avatar_url.clone(),
    };

    let repo_name = non_empty(event.repo.as_ref()?.name.as_deref())?;
    let repo = ActivityRepo {
        name: repo_name.to_owned(),
        url: format!("https://github.com/{repo_name}"),
    };

    let payload = &event.payload;
    let draft = match kind {
        "IssuesEvent" => issue_opened(payload),
        "PullRequestEvent" => pull_request(payload, detail, repo_name),
        "IssueCommentEvent" => issue_comment(payload, repo_name),
        "PullRequestReviewEvent" => review(payload, repo_name),
        "PullRequestReviewCommentEvent" => review_comment(payload, repo_name),
        "ReleaseEvent" => release(payload),
        _ => None,
    }?;

    let id = event
        .id
        .clone()
        .unwrap_or_else(|| format!("synthetic:{}", draft.url));

    Some(ActivityItem {
        id,
        kind: draft.kind,
        created_at,
        actor,
        repo,
        title: draft.title,
        url: draft.url,
        summary: draft.summary,
        review_state: draft.review_state,
    })
}

struct Draft {
    kind: ActivityKind,
    title: String,
    url: String,
    summary: Option<String>,
    review_state: Option<ReviewState>,
}

impl Draft {
    fn new(kind: ActivityKind, title: String, url: String) -> Self {
        Self {
            kind,
            title,
            url,
            summary: None,
            review_state: None,
        }
    }

    fn with_summary(mut self, body: Option<&str>) -> Self {
        self.summary = body.and_then(summarise);
        self
    }
}

fn issue_opened(payload: &ApiEventPayload) -> Option<Draft> {
    if payload.action.as_deref() != Some("opened") {
        return None;
    }
    let issue = payload.issue.as_ref()?;
    let title = non_empty(issue.title.as_deref())?;
    let url = non_empty(issue.html_url.as_deref())?;
    Some(
        Draft::new(ActivityKind::IssueOpened, title.to_owned(), url.to_owned())
            .with_summary(issue.body.as_deref()),
    )
}

fn pull_request(
    payload: &ApiEventPayload,
    detail: Option<&PullRequestDetail>,
    repo_name: &str,
) -> Option<Draft> {
    let action = payload.action.as_deref()?;
    let embedded = payload.pull_request.as_ref();

    let merged = embedded
        .and_then(|pr| pr.merged)
        .unwrap_or_else(|| {
            embedded.is_some_and(|pr| pr.merged_at.is_some())
                || detail.is_some_and(|d| d.merged)
        });

    let (kind, verb) = match action {
        "opened" => (ActivityKind::PullRequestOpened, "Opened"),
        "reopened" => (ActivityKind::PullRequestReopened, "Reopened"),
        "closed" if merged => (ActivityKind::PullRequestMerged, "Merged"),
        "closed" => (ActivityKind::PullRequestClosed, "Closed"),
        _ => return None,
    };

    let number = embedded
        .and_then(|pr| pr.number)
        .or(payload.number)
        .or(detail.and_then(|d| d.number));

    let title = embedded
        .and_then(|pr| non_empty(pr.title.as_deref()))
        .or_else(|| detail.and_then(|d| non_empty(d.title.as_deref())))
        .map(ToOwned::to_owned)
        .or_else(|| number.map(|n| format!("{verb} pull request #{n}")))?;

    let url = embedded
        .and_then(|pr| non_empty(pr.html_url.as_deref()))
        .or_else(|| detail.and_then(|d| non_empty(d.html_url.as_deref())))
        .map(ToOwned::to_owned)
        .or_else(|| number.map(|n| format!("https://github.com/{repo_name}/pull/{n}")))?;

    let body = embedded
        .and_then(|pr| pr.body.as_deref())
        .or_else(|| detail.and_then(|d| d.body.as_deref()));

    Some(Draft::new(kind, title, url).with_summary(body))
}

fn issue_comment(payload: &ApiEventPayload, repo_name: &str) -> Option<Draft> {
    if payload.action.as_deref() != Some("created") {
        return None;
    }
    let comment = payload.comment.as_ref();
    let issue = payload.issue.as_ref();

    let url = comment
        .and_then(|c| non_empty(c.html_url.as_deref()))
        .or_else(|| issue.and_then(|i| non_empty(i.html_url.as_deref())))?
        .to_owned();

    let title = issue
        .and_then(|i| non_empty(i.title.as_deref()))
        .map(ToOwned::to_owned)
        .or_else(|| {
            issue
                .and_then(|i| i.number)
                .map(|n| format!("Comment on {repo_name}#{n}"))
        })?;

    Some(
        Draft::new(ActivityKind::IssueOrPrComment, title, url)
            .with_summary(comment.and_then(|c| c.body.as_deref())),
    )
}

fn review(payload: &ApiEventPayload, repo_name: &str) -> Option<Draft> {
    if !matches!(payload.action.as_deref(), Some("created" | "submitted")) {
        return None;
    }
    let submitted = payload.review.as_ref()?;
    let state = submitted.state.as_deref().and_then(ReviewState::parse);

    // GitHub emits a near-empty "commented" review event alongside the
    // review-comment event for the same human action; suppress the duplicate.
    let body_is_blank = submitted
        .body
        .as_deref()
        .is_none_or(|body| body.trim().is_empty());
    if state == Some(ReviewState::Commented) && body_is_blank {
        return None;
    }

    let embedded = payload.pull_request.as_ref();
    let url = submitted
        .html_url
        .as_deref()
        .and_then(non_empty_str)
        .or_else(|| embedded.and_then(|pr| non_empty(pr.html_url.as_deref())))?
        .to_owned();

    let title = embedded
        .and_then(|pr| non_empty(pr.title.as_deref()))
        .map(ToOwned::to_owned)
        .or_else(|| {
            embedded
                .and_then(|pr| pr.number)
                .map(|n| format!("Reviewed {repo_name}#{n}"))
        })?;

    let mut draft = Draft::new(ActivityKind::PullRequestReview, title, url)
        .with_summary(submitted.body.as_deref());
    draft.review_state = state;
    Some(draft)
}

fn review_comment(payload: &ApiEventPayload, repo_name: &str) -> Option<Draft> {
    if payload.action.as_deref() != Some("created") {
        return None;
    }
    let comment = payload.comment.as_ref();
    let embedded = payload.pull_request.as_ref();

    let url = comment
        .and_then(|c| non_empty(c.html_url.as_deref()))
        .or_else(|| embedded.and_then(|pr| non_empty(pr.html_url.as_deref())))?
        .to_owned();

    let title = embedded
        .and_then(|pr| non_empty(pr.title.as_deref()))
        .map(ToOwned::to_owned)
        .or_else(|| {
            embedded
                .and_then(|pr| pr.number)
                .map(|n| format!("Commented on {repo_name}#{n}"))
        })?;

    Some(
        Draft::new(ActivityKind::PullRequestReviewComment, title, url)
            .with_summary(comment.and_then(|c| c.body.as_deref())),
    )
}

fn release(payload: &ApiEventPayload) -> Option<Draft> {
    if payload.action.as_deref() != Some("published") {
        return None;
    }
    let published = payload.release.as_ref()?;
    let title = non_empty(published.name.as_deref())
        .or_else(|| non_empty(published.tag_name.as_deref()))?
        .to_owned();
    let url = non_empty(published.html_url.as_deref())?.to_owned();
    Some(
        Draft::new(ActivityKind::ReleasePublished, title, url)
            .with_summary(published.body.as_deref()),
    )
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(non_empty_str)
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(value) }
}
