//! Orchestration of the event-fetch and enrichment pipeline.
//!
//! The aggregator drives page fetching, fork filtering, pull-request
//! enrichment, normalisation, URL deduplication, and the final newest-first
//! sort. Partial failure is first-class: enrichment failures degrade the
//! response rather than abort it, and a page failure aborts only when
//! nothing has been collected yet.
//!
//! Per-page processing is sequential, but enrichment within a page fans out
//! through a `JoinSet` owned by the run, so dropping the run (caller
//! disconnect) aborts in-flight upstream calls.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use tokio::task::JoinSet;

use crate::github::models::ApiEvent;
use crate::github::{EventSource, GitHubError, PullRequestDetail};

use super::models::{ActivityItem, ActivityResponse};
use super::normalise::normalise;
use super::resolve::{ForkResolver, PullRequestResolver};

/// Tuning for one aggregator instance.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Page budget per full run.
    pub max_pages: u32,
    /// Events requested per page.
    pub per_page: u32,
    /// Item cap for the full feed.
    pub limit: usize,
    /// Item cap for the preview variant.
    pub preview_limit: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            max_pages: crate::github::events::DEFAULT_MAX_PAGES,
            per_page: crate::github::events::DEFAULT_PER_PAGE,
            limit: 30,
            preview_limit: 10,
        }
    }
}

/// Mutable state of one aggregation run.
#[derive(Default)]
struct Run {
    items: Vec<ActivityItem>,
    seen_urls: HashSet<String>,
    partial: bool,
    first_error: Option<GitHubError>,
}

impl Run {
    fn record_failure(&mut self, error: GitHubError) {
        tracing::warn!(kind = %error.kind, message = %error.message, "absorbed upstream failure");
        self.partial = true;
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    fn admit(&mut self, item: ActivityItem) {
        // First occurrence wins; pages arrive newest-first.
        if self.seen_urls.insert(item.url.clone()) {
            self.items.push(item);
        }
    }
}

/// Builds activity responses from the events feed plus enrichment.
#[derive(Clone)]
pub struct Aggregator {
    source: EventSource,
    forks: ForkResolver,
    pulls: PullRequestResolver,
    options: AggregatorOptions,
}

impl Aggregator {
    /// Creates an aggregator over the given source and resolvers.
    #[must_use]
    pub fn new(
        source: EventSource,
        forks: ForkResolver,
        pulls: PullRequestResolver,
        options: AggregatorOptions,
    ) -> Self {
        Self {
            source,
            forks,
            pulls,
            options,
        }
    }

    /// Runs the full pipeline for `username`.
    ///
    /// # Errors
    ///
    /// Fails only when a page fetch fails before any item was collected;
    /// later failures degrade the response to `partial` instead.
    pub async fn collect(&self, username: &str) -> Result<ActivityResponse, GitHubError> {
        let mut run = Run::default();
        let mut next_url = Some(
            self.source
                .first_page_url(username, self.options.per_page),
        );
        let mut pages_fetched = 0u32;

        while let Some(url) = next_url.take() {
            if pages_fetched >= self.options.max_pages || run.items.len() >= self.options.limit {
                break;
            }
            pages_fetched += 1;

            let page = match self.source.fetch_page(&url).await {
                Ok(page) => page,
                Err(error) if run.items.is_empty() => return Err(error),
                Err(error) => {
                    run.record_failure(error);
                    break;
                }
            };
            next_url = page.next_url;

            self.process_page(page.events, &mut run).await;
        }

        tracing::debug!(
            username,
            pages = pages_fetched,
            items = run.items.len(),
            partial = run.partial,
            "aggregation run finished"
        );
        Ok(finish(run, username, self.options.limit))
    }

    /// Single-page fast variant for initial paint.
    ///
    /// Uses only data already present in event payloads: no fork lookups, no
    /// pull-request enrichment. Missing pull-request titles are synthesised
    /// by the normaliser rather than dropped.
    ///
    /// # Errors
    ///
    /// Propagates the page-fetch failure; there is never anything collected
    /// to keep.
    pub async fn preview(&self, username: &str) -> Result<ActivityResponse, GitHubError> {
        let url = self
            .source
            .first_page_url(username, self.options.per_page);
        let page = self.source.fetch_page(&url).await?;

        let mut run = Run::default();
        for event in &page.events {
            if let Some(item) = normalise(event, None) {
                run.admit(item);
            }
        }
        Ok(finish(run, username, self.options.preview_limit))
    }

    async fn process_page(&self, events: Vec<ApiEvent>, run: &mut Run) {
        let fork_flags = self.resolve_forks(&events, run).await;
        let kept: Vec<ApiEvent> = events
            .into_iter()
            .filter(|event| !is_fork(event, &fork_flags))
            .collect();

        let details = self.resolve_details(&kept, run).await;
        for event in &kept {
            if run.items.len() >= self.options.limit {
                break;
            }
            let detail = detail_url(event, self.source.api_base())
                .and_then(|key| details.get(&key));
            if let Some(item) = normalise(event, detail) {
                run.admit(item);
            }
        }
    }

    /// Resolves fork status for the page's distinct repositories in
    /// parallel. Failures fail open (treated as not a fork) and mark the
    /// run partial.
    async fn resolve_forks(&self, events: &[ApiEvent], run: &mut Run) -> HashMap<String, bool> {
        let repo_urls: BTreeSet<String> = events
            .iter()
            .filter_map(|event| event.repo.as_ref()?.url.clone())
            .collect();

        let mut lookups = JoinSet::new();
        for url in repo_urls {
            let resolver = self.forks.clone();
            lookups.spawn(async move {
                let resolved = resolver.resolve(&url).await;
                (url, resolved)
            });
        }

        let mut flags = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            let Ok((url, resolved)) = joined else {
                continue;
            };
            match resolved {
                Ok(fork) => {
                    flags.insert(url, fork);
                }
                Err(error) => {
                    flags.insert(url, false);
                    run.record_failure(error);
                }
            }
        }
        flags
    }

    /// Resolves pull-request detail for the page's trimmed PR events in
    /// parallel. Failures are absorbed; the events are still normalised
    /// from payload data alone.
    async fn resolve_details(
        &self,
        events: &[ApiEvent],
        run: &mut Run,
    ) -> HashMap<String, PullRequestDetail> {
        let detail_urls: BTreeSet<String> = events
            .iter()
            .filter(|event| needs_detail(event))
            .filter_map(|event| detail_url(event, self.source.api_base()))
            .collect();

        let mut lookups = JoinSet::new();
        for url in detail_urls {
            let resolver = self.pulls.clone();
            lookups.spawn(async move {
                let resolved = resolver.resolve(&url).await;
                (url, resolved)
            });
        }

        let mut details = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            let Ok((url, resolved)) = joined else {
                continue;
            };
            match resolved {
                Ok(detail) => {
                    details.insert(url, detail);
                }
                Err(error) => run.record_failure(error),
            }
        }
        details
    }
}

fn finish(run: Run, username: &str, limit: usize) -> ActivityResponse {
    let mut items = run.items;
    // Stable sort: ties keep their insertion (event-feed) order.
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(limit);

    ActivityResponse {
        username: username.to_owned(),
        generated_at: Utc::now(),
        items,
        partial: run.partial,
        error_info: run.first_error,
    }
}

fn is_fork(event: &ApiEvent, flags: &HashMap<String, bool>) -> bool {
    event
        .repo
        .as_ref()
        .and_then(|repo| repo.url.as_deref())
        .is_some_and(|url| flags.get(url).copied().unwrap_or(false))
}

/// Whether the event payload is too trimmed to normalise well on its own.
fn needs_detail(event: &ApiEvent) -> bool {
    if event.kind.as_deref() != Some("PullRequestEvent") {
        return false;
    }
    let action = event.payload.action.as_deref();
    if !matches!(action, Some("opened" | "reopened" | "closed")) {
        return false;
    }
    let Some(embedded) = event.payload.pull_request.as_ref() else {
        return true;
    };
    let missing_title = embedded.title.as_deref().is_none_or(|t| t.trim().is_empty());
    let missing_merge_outcome = action == Some("closed")
        && embedded.merged.is_none()
        && embedded.merged_at.is_none();
    missing_title || missing_merge_outcome
}

/// API URL used as the enrichment key for a pull-request event.
fn detail_url(event: &ApiEvent, api_base: &str) -> Option<String> {
    let payload = &event.payload;
    if let Some(url) = payload
        .pull_request
        .as_ref()
        .and_then(|pr| pr.url.clone())
    {
        return Some(url);
    }
    let number = payload
        .pull_request
        .as_ref()
        .and_then(|pr| pr.number)
        .or(payload.number)?;
    let repo = event.repo.as_ref()?.name.as_deref()?;
    Some(format!("{api_base}/repos/{repo}/pulls/{number}"))
}
