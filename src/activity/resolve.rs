//! Memoised, concurrency-capped enrichment resolvers.
//!
//! Two lookups enrich raw events before normalisation: whether a repository
//! is a fork, and full pull-request detail for trimmed event payloads. Each
//! resolver keeps an in-run memo table keyed by upstream URL and can sit in
//! front of a shared [`CacheStore`] with a short TTL to amortise cost across
//! runs. All upstream calls pass through one FIFO semaphore so enrichment
//! fan-out stays bounded against the rate limit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};

use crate::cache::CacheStore;
use crate::github::models::ApiRepository;
use crate::github::{GitHubError, GitHubErrorKind, PullRequestDetail, UpstreamClient};

/// Cross-run TTL for repository fork status.
pub const FORK_STATUS_TTL: Duration = Duration::from_secs(300);

/// Cross-run TTL for pull-request detail.
pub const PR_DETAIL_TTL: Duration = Duration::from_secs(180);

/// Default bound on concurrent in-flight enrichment calls.
pub const DEFAULT_RESOLVER_CONCURRENCY: usize = 4;

/// Builds the limiter shared by both resolvers.
///
/// `tokio`'s semaphore is fair, so queued lookups are admitted in arrival
/// order, one in per one out.
#[must_use]
pub fn resolver_limiter(concurrency: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(concurrency.max(1)))
}

/// Resolves whether a repository is a fork, by repository API URL.
#[derive(Clone)]
pub struct ForkResolver {
    client: UpstreamClient,
    memo: Arc<Mutex<HashMap<String, bool>>>,
    limiter: Arc<Semaphore>,
    shared: Option<Arc<dyn CacheStore>>,
}

impl ForkResolver {
    /// Creates a resolver; `shared` enables the cross-run cache layer.
    #[must_use]
    pub fn new(
        client: UpstreamClient,
        limiter: Arc<Semaphore>,
        shared: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        Self {
            client,
            memo: Arc::new(Mutex::new(HashMap::new())),
            limiter,
            shared,
        }
    }

    /// Resolves the fork flag for the repository at `repo_api_url`.
    ///
    /// Callers are expected to fail open on error: the fork filter is a
    /// noise reduction, and availability beats filter correctness.
    ///
    /// # Errors
    ///
    /// Propagates the classified upstream failure.
    pub async fn resolve(&self, repo_api_url: &str) -> Result<bool, GitHubError> {
        if let Some(known) = self.memo.lock().await.get(repo_api_url) {
            return Ok(*known);
        }

        let cache_key = format!("fork:{repo_api_url}");
        if let Some(shared) = self.shared.as_deref()
            && let Some(cached) = shared.get(&cache_key).await
        {
            let fork = cached == "1";
            self.memo.lock().await.insert(repo_api_url.to_owned(), fork);
            return Ok(fork);
        }

        let fork = {
            let _permit = acquire(&self.limiter).await?;
            self.client
                .request_json::<ApiRepository>(repo_api_url)
                .await?
                .fork
        };

        self.memo.lock().await.insert(repo_api_url.to_owned(), fork);
        if let Some(shared) = self.shared.as_deref() {
            let value = if fork { "1" } else { "0" };
            shared
                .put(&cache_key, value.to_owned(), Some(FORK_STATUS_TTL))
                .await;
        }
        Ok(fork)
    }
}

/// Resolves full pull-request detail, by pull-request API URL.
#[derive(Clone)]
pub struct PullRequestResolver {
    client: UpstreamClient,
    memo: Arc<Mutex<HashMap<String, PullRequestDetail>>>,
    limiter: Arc<Semaphore>,
    shared: Option<Arc<dyn CacheStore>>,
}

impl PullRequestResolver {
    /// Creates a resolver; `shared` enables the cross-run cache layer.
    #[must_use]
    pub fn new(
        client: UpstreamClient,
        limiter: Arc<Semaphore>,
        shared: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        Self {
            client,
            memo: Arc::new(Mutex::new(HashMap::new())),
            limiter,
            shared,
        }
    }

    /// Resolves detail for the pull request at `pr_api_url`.
    ///
    /// On failure the caller still emits the event with best-effort
    /// synthesised fields and marks the run partial.
    ///
    /// # Errors
    ///
    /// Propagates the classified upstream failure.
    pub async fn resolve(&self, pr_api_url: &str) -> Result<PullRequestDetail, GitHubError> {
        if let Some(known) = self.memo.lock().await.get(pr_api_url) {
            return Ok(known.clone());
        }

        let cache_key = format!("pr:{pr_api_url}");
        if let Some(shared) = self.shared.as_deref()
            && let Some(cached) = shared.get(&cache_key).await
            && let Ok(detail) = serde_json::from_str::<PullRequestDetail>(&cached)
        {
            self.memo
                .lock()
                .await
                .insert(pr_api_url.to_owned(), detail.clone());
            return Ok(detail);
        }

        let detail: PullRequestDetail = {
            let _permit = acquire(&self.limiter).await?;
            self.client
                .request_json::<crate::github::models::ApiPullRequest>(pr_api_url)
                .await?
                .into()
        };

        self.memo
            .lock()
            .await
            .insert(pr_api_url.to_owned(), detail.clone());
        if let Some(shared) = self.shared.as_deref()
            && let Ok(serialised) = serde_json::to_string(&detail)
        {
            shared.put(&cache_key, serialised, Some(PR_DETAIL_TTL)).await;
        }
        Ok(detail)
    }
}

async fn acquire(
    limiter: &Arc<Semaphore>,
) -> Result<tokio::sync::SemaphorePermit<'_>, GitHubError> {
    limiter.acquire().await.map_err(|_| {
        GitHubError::new(
            GitHubErrorKind::Unknown,
            "enrichment limiter closed unexpectedly",
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::cache::MemoryStore;
    use crate::github::{UpstreamClient, UpstreamClientConfig};

    use super::{ForkResolver, PullRequestResolver, resolver_limiter};

    fn client() -> UpstreamClient {
        UpstreamClient::new(&UpstreamClientConfig::default()).expect("client should build")
    }

    #[tokio::test]
    async fn fork_status_is_memoised_within_a_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fork": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = ForkResolver::new(client(), resolver_limiter(4), None);
        let url = format!("{}/repos/acme/widget", server.uri());

        assert!(resolver.resolve(&url).await.expect("first call"));
        assert!(resolver.resolve(&url).await.expect("memoised call"));
    }

    #[tokio::test]
    async fn fork_status_shared_cache_spans_resolvers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fork": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store: Arc<MemoryStore> = MemoryStore::shared();
        let url = format!("{}/repos/acme/widget", server.uri());

        let first = ForkResolver::new(client(), resolver_limiter(4), Some(store.clone()));
        assert!(!first.resolve(&url).await.expect("first run"));

        // A fresh resolver (new run, empty memo) must hit the shared cache,
        // not the network.
        let second = ForkResolver::new(client(), resolver_limiter(4), Some(store));
        assert!(!second.resolve(&url).await.expect("second run"));
    }

    #[tokio::test]
    async fn fork_resolution_failure_propagates_for_fail_open_callers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let resolver = ForkResolver::new(client(), resolver_limiter(4), None);
        let error = resolver
            .resolve(&format!("{}/repos/acme/gone", server.uri()))
            .await
            .expect_err("lookup should fail");
        assert_eq!(error.kind, crate::github::GitHubErrorKind::NotFound);
    }

    #[tokio::test]
    async fn pull_request_detail_is_memoised_and_converted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/pulls/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "number": 5,
                "title": "Add feature",
                "html_url": "https://github.com/acme/widget/pull/5",
                "merged_at": "2025-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = PullRequestResolver::new(client(), resolver_limiter(4), None);
        let url = format!("{}/repos/acme/widget/pulls/5", server.uri());

        let detail = resolver.resolve(&url).await.expect("first call");
        assert_eq!(detail.title.as_deref(), Some("Add feature"));
        assert!(detail.merged);

        let memoised = resolver.resolve(&url).await.expect("memoised call");
        assert_eq!(memoised, detail);
    }

    #[tokio::test]
    async fn limiter_bounds_concurrent_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"fork": false}))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let limiter = resolver_limiter(2);
        let resolver = ForkResolver::new(client(), limiter.clone(), None);

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..6 {
            let task_resolver = resolver.clone();
            let url = format!("{}/repos/acme/widget-{n}", server.uri());
            tasks.spawn(async move { task_resolver.resolve(&url).await });
        }

        while let Some(joined) = tasks.join_next().await {
            let resolved = joined.expect("task should not panic");
            assert!(!resolved.expect("lookup should succeed"));
        }
        // All six distinct URLs resolved despite only two permits.
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn queued_lookups_are_admitted_in_arrival_order() {
        let limiter = resolver_limiter(1);
        let admissions = Arc::new(std::sync::Mutex::new(Vec::new()));

        // Hold the sole permit so every lookup below has to queue.
        let gate = limiter
            .clone()
            .acquire_owned()
            .await
            .expect("limiter should be open");

        let mut waiters = Vec::new();
        for n in 0..4u32 {
            let task_limiter = limiter.clone();
            let task_admissions = admissions.clone();
            waiters.push(tokio::spawn(async move {
                let _permit = task_limiter
                    .acquire()
                    .await
                    .expect("limiter should be open");
                task_admissions
                    .lock()
                    .expect("admissions mutex should be available")
                    .push(n);
            }));
            // Let the task park in the semaphore queue before the next
            // one is spawned, pinning its arrival position.
            tokio::task::yield_now().await;
        }

        drop(gate);
        for waiter in waiters {
            waiter.await.expect("waiter should not panic");
        }

        let order = admissions
            .lock()
            .expect("admissions mutex should be available")
            .clone();
        assert_eq!(order, vec![0, 1, 2, 3], "admission must be first come, first served");
    }
}
