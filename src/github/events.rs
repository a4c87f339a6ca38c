//! Paginated access to a user's public events feed.
//!
//! `EventSource` turns raw pages of `/users/{username}/events/public` into
//! parsed events plus the `rel="next"` URL from the `Link` header. GitHub
//! caps pagination depth on this endpoint and signals the cap with a 422
//! validation error; that response is an expected end of stream, not a
//! failure, and is mapped to an empty final page.

use http::header::LINK;

use super::client::{UpstreamClient, UpstreamResponse};
use super::error::{GitHubError, GitHubErrorKind};
use super::models::ApiEvent;

/// Default page size requested from the events endpoint.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Default page budget per aggregation run.
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// Public GitHub API base.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// One fetched page of raw events.
#[derive(Debug, Clone)]
pub struct EventPage {
    /// Parsed events, in GitHub's newest-first order.
    pub events: Vec<ApiEvent>,
    /// URL of the next page, when the `Link` header advertises one.
    pub next_url: Option<String>,
}

impl EventPage {
    const fn end_of_stream() -> Self {
        Self {
            events: Vec::new(),
            next_url: None,
        }
    }
}

/// Lazy page-by-page reader of the public events endpoint.
#[derive(Debug, Clone)]
pub struct EventSource {
    client: UpstreamClient,
    api_base: String,
}

impl EventSource {
    /// Creates a source reading through the given client.
    #[must_use]
    pub fn new(client: UpstreamClient, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    /// API base this source reads from.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// URL of the first events page for `username`.
    #[must_use]
    pub fn first_page_url(&self, username: &str, per_page: u32) -> String {
        format!(
            "{}/users/{username}/events/public?per_page={per_page}",
            self.api_base
        )
    }

    /// Fetches and parses one page.
    ///
    /// # Errors
    ///
    /// Propagates classified upstream failures, except the pagination-limit
    /// validation response, which yields a clean empty final page.
    pub async fn fetch_page(&self, url: &str) -> Result<EventPage, GitHubError> {
        match self.client.request(url).await {
            Ok(response) => parse_page(&response),
            Err(error) if error.is_pagination_limited() => {
                tracing::debug!(url, "events pagination limit reached; ending stream");
                Ok(EventPage::end_of_stream())
            }
            Err(error) => Err(error),
        }
    }
}

fn parse_page(response: &UpstreamResponse) -> Result<EventPage, GitHubError> {
    let events: Vec<ApiEvent> = serde_json::from_str(&response.body).map_err(|error| {
        GitHubError::new(
            GitHubErrorKind::Unknown,
            format!("events page deserialisation failed: {error}"),
        )
    })?;

    let next_url = response
        .headers
        .get(LINK)
        .and_then(|raw| raw.to_str().ok())
        .and_then(parse_next_link);

    Ok(EventPage { events, next_url })
}

/// Extracts the `rel="next"` target from a `Link` header value.
fn parse_next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut sections = part.split(';');
        let target = sections.next()?.trim();
        let is_next = sections
            .map(str::trim)
            .any(|param| param == "rel=\"next\"" || param == "rel=next");
        if is_next {
            return Some(
                target
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_owned(),
            );
        }
    }
    None
}
