//! Stale-while-revalidate edge cache with stampede control.
//!
//! Each endpoint/username pair maps to one stored entry. Fresh entries are
//! served as-is. Stale and expired-but-present entries are served
//! immediately while a single detached refresh runs behind a short-lived
//! lease, so concurrent stale hits trigger one upstream run rather than a
//! stampede. Only a true miss awaits the refresh inline. A failed refresh
//! never evicts: the previous entry keeps being served until a refresh
//! succeeds. Rate-limit failures are recorded in a side channel so further
//! refresh attempts are skipped until the advertised reset.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::rate_limit::now_unix_seconds;
use crate::github::{GitHubError, GitHubErrorKind};

use super::policy::{CachePolicy, Freshness};
use super::store::CacheStore;

/// Version prefix on entry keys; bump when [`StoredResponse`] changes shape
/// so stale schemas read as misses instead of parse failures.
pub const SCHEMA_VERSION: u32 = 1;

/// How long a revalidation lease suppresses further refresh attempts.
pub const LEASE_TTL: Duration = Duration::from_secs(15);

/// One cached endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
    /// When the body was generated.
    pub generated_at: DateTime<Utc>,
    /// Serialised response body.
    pub body: String,
}

/// How the served body relates to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Served from a fresh entry.
    Hit,
    /// Served from an aged entry while a refresh runs (or is suppressed).
    Stale,
    /// No usable entry existed; the body was fetched inline.
    Miss,
}

impl CacheState {
    /// Lowercase form for the diagnostics response header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stale => "stale",
            Self::Miss => "miss",
        }
    }
}

/// A response produced by [`EdgeCache::serve`].
#[derive(Debug, Clone)]
pub struct Served {
    /// Serialised response body.
    pub body: String,
    /// When the body was generated.
    pub generated_at: DateTime<Utc>,
    /// Cache disposition.
    pub state: CacheState,
    /// Upstream rate-limit reset (unix seconds), when refreshes are
    /// currently suppressed by the side channel.
    pub rate_limit_reset: Option<u64>,
}

/// Serve-side cache front for one point of presence.
#[derive(Clone)]
pub struct EdgeCache {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
}

impl EdgeCache {
    /// Creates a cache over `store` with the given freshness policy.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    /// The freshness policy in force.
    #[must_use]
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Serves `endpoint` for `username`, refreshing via `refresh` as the
    /// entry's freshness demands.
    ///
    /// # Errors
    ///
    /// Fails only on a miss whose inline refresh fails; aged entries absorb
    /// refresh failures and keep serving.
    pub async fn serve<F, Fut>(
        &self,
        endpoint: &str,
        username: &str,
        refresh: F,
    ) -> Result<Served, GitHubError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<StoredResponse, GitHubError>> + Send + 'static,
    {
        let key = entry_key(endpoint, username);

        let entry = self
            .store
            .get(&key)
            .await
            .and_then(|raw| serde_json::from_str::<StoredResponse>(&raw).ok());

        let Some(entry) = entry else {
            return self.refresh_inline(&key, username, refresh).await;
        };

        match self.policy.classify(entry.generated_at, Utc::now()) {
            Freshness::Fresh => {
                tracing::debug!(endpoint, username, "serving fresh entry");
                Ok(served(entry, CacheState::Hit, None))
            }
            Freshness::Stale | Freshness::Expired => {
                let suppressed_until = self.rate_limited_until(username).await;
                tracing::debug!(
                    endpoint,
                    username,
                    suppressed = suppressed_until.is_some(),
                    "serving aged entry"
                );
                if suppressed_until.is_none() {
                    self.spawn_refresh(endpoint, username, refresh).await;
                }
                Ok(served(entry, CacheState::Stale, suppressed_until))
            }
        }
    }

    /// Awaits the refresh and stores its result; the miss path.
    async fn refresh_inline<F, Fut>(
        &self,
        key: &str,
        username: &str,
        refresh: F,
    ) -> Result<Served, GitHubError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<StoredResponse, GitHubError>> + Send,
    {
        match refresh().await {
            Ok(stored) => {
                self.store_entry(key, &stored).await;
                Ok(served(stored, CacheState::Miss, None))
            }
            Err(error) => {
                self.record_rate_limit(username, &error).await;
                Err(error)
            }
        }
    }

    /// Takes the revalidation lease and runs the refresh detached. Skips
    /// quietly when another refresh already holds the lease.
    async fn spawn_refresh<F, Fut>(&self, endpoint: &str, username: &str, refresh: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<StoredResponse, GitHubError>> + Send + 'static,
    {
        let lease = lease_key(endpoint, username);
        if self.store.get(&lease).await.is_some() {
            tracing::debug!(endpoint, username, "refresh already leased; skipping");
            return;
        }
        self.store.put(&lease, "1".to_owned(), Some(LEASE_TTL)).await;

        let cache = self.clone();
        let key = entry_key(endpoint, username);
        let endpoint = endpoint.to_owned();
        let username = username.to_owned();
        tokio::spawn(async move {
            match refresh().await {
                Ok(stored) => {
                    cache.store_entry(&key, &stored).await;
                    tracing::debug!(endpoint, username, "background refresh stored");
                }
                Err(error) => {
                    tracing::warn!(
                        endpoint,
                        username,
                        kind = %error.kind,
                        message = %error.message,
                        "background refresh failed; keeping previous entry"
                    );
                    cache.record_rate_limit(&username, &error).await;
                }
            }
        });
    }

    /// Writes the entry without a TTL: aged entries outlive their windows so
    /// there is always something to serve while upstream misbehaves.
    async fn store_entry(&self, key: &str, stored: &StoredResponse) {
        match serde_json::to_string(stored) {
            Ok(serialised) => self.store.put(key, serialised, None).await,
            Err(error) => {
                tracing::error!(%error, "cache entry serialisation failed; entry not stored");
            }
        }
    }

    /// Reads the rate-limit side channel; `Some(reset)` while the advertised
    /// reset is still in the future.
    async fn rate_limited_until(&self, username: &str) -> Option<u64> {
        let raw = self.store.get(&rate_limit_key(username)).await?;
        let reset: u64 = raw.parse().ok()?;
        (reset > now_unix_seconds()).then_some(reset)
    }

    /// Records a rate-limit failure's reset in the side channel.
    async fn record_rate_limit(&self, username: &str, error: &GitHubError) {
        if error.kind != GitHubErrorKind::RateLimit {
            return;
        }
        let Some(reset) = error.rate_limit_reset else {
            return;
        };
        let ttl = reset.saturating_sub(now_unix_seconds());
        if ttl == 0 {
            return;
        }
        self.store
            .put(
                &rate_limit_key(username),
                reset.to_string(),
                Some(Duration::from_secs(ttl)),
            )
            .await;
        tracing::info!(username, reset, "rate limited; refreshes suppressed until reset");
    }
}

fn served(entry: StoredResponse, state: CacheState, rate_limit_reset: Option<u64>) -> Served {
    Served {
        body: entry.body,
        generated_at: entry.generated_at,
        state,
        rate_limit_reset,
    }
}

fn entry_key(endpoint: &str, username: &str) -> String {
    format!("v{SCHEMA_VERSION}:{endpoint}:{username}")
}

fn lease_key(endpoint: &str, username: &str) -> String {
    format!("{endpoint}:{username}:lock")
}

fn rate_limit_key(username: &str) -> String {
    format!("ratelimit:{username}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};

    use crate::cache::{CachePolicy, CacheState, CacheStore, MemoryStore};
    use crate::github::rate_limit::now_unix_seconds;
    use crate::github::{GitHubError, GitHubErrorKind};

    use super::{EdgeCache, StoredResponse, entry_key};

    fn cache_over(store: Arc<MemoryStore>) -> EdgeCache {
        EdgeCache::new(store, CachePolicy::default())
    }

    async fn seed(store: &MemoryStore, age_seconds: i64, body: &str) {
        let stored = StoredResponse {
            generated_at: Utc::now() - TimeDelta::seconds(age_seconds),
            body: body.to_owned(),
        };
        let serialised = serde_json::to_string(&stored).expect("should serialise");
        store.put(&entry_key("feed", "alice"), serialised, None).await;
    }

    type BoxedRefresh = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<StoredResponse, GitHubError>> + Send>,
    >;

    fn failing_refresh(error: GitHubError) -> impl FnOnce() -> BoxedRefresh + Send + 'static {
        move || Box::pin(async move { Err(error) })
    }

    fn counting_refresh(
        counter: &Arc<AtomicUsize>,
        body: &str,
    ) -> impl FnOnce() -> BoxedRefresh + Send + 'static {
        let counter = counter.clone();
        let body = body.to_owned();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(StoredResponse {
                    generated_at: Utc::now(),
                    body,
                })
            })
        }
    }

    #[tokio::test]
    async fn miss_refreshes_inline_and_stores() {
        let store = MemoryStore::shared();
        let cache = cache_over(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let served = cache
            .serve("feed", "alice", counting_refresh(&calls, "fresh body"))
            .await
            .expect("miss should refresh");

        assert_eq!(served.state, CacheState::Miss);
        assert_eq!(served.body, "fresh body");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.get(&entry_key("feed", "alice")).await.is_some());
    }

    #[tokio::test]
    async fn fresh_entry_is_served_without_refreshing() {
        let store = MemoryStore::shared();
        seed(&store, 10, "cached body").await;
        let cache = cache_over(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let served = cache
            .serve("feed", "alice", counting_refresh(&calls, "unused"))
            .await
            .expect("hit should serve");

        assert_eq!(served.state, CacheState::Hit);
        assert_eq!(served.body, "cached body");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_entry_is_served_while_refreshing_in_background() {
        let store = MemoryStore::shared();
        seed(&store, 120, "old body").await;
        let cache = cache_over(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let served = cache
            .serve("feed", "alice", counting_refresh(&calls, "new body"))
            .await
            .expect("stale should serve");
        assert_eq!(served.state, CacheState::Stale);
        assert_eq!(served.body, "old body");

        // Let the detached refresh run to completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let raw = store
            .get(&entry_key("feed", "alice"))
            .await
            .expect("entry should remain");
        let updated: StoredResponse = serde_json::from_str(&raw).expect("should parse");
        assert_eq!(updated.body, "new body");
    }

    #[tokio::test]
    async fn concurrent_stale_hits_trigger_one_refresh() {
        let store = MemoryStore::shared();
        seed(&store, 120, "old body").await;
        let cache = cache_over(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .serve("feed", "alice", counting_refresh(&calls, "new body"))
            .await
            .expect("first stale serve");
        let second = cache
            .serve("feed", "alice", counting_refresh(&calls, "new body"))
            .await
            .expect("second stale serve");

        assert_eq!(first.state, CacheState::Stale);
        assert_eq!(second.state, CacheState::Stale);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "lease should dedupe");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_entry() {
        let store = MemoryStore::shared();
        seed(&store, 120, "old body").await;
        let cache = cache_over(store.clone());

        let served = cache
            .serve(
                "feed",
                "alice",
                failing_refresh(GitHubError::new(GitHubErrorKind::Server, "upstream exploded")),
            )
            .await
            .expect("stale serve should absorb the failure");
        assert_eq!(served.body, "old body");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let raw = store
            .get(&entry_key("feed", "alice"))
            .await
            .expect("entry must never be evicted");
        let kept: StoredResponse = serde_json::from_str(&raw).expect("should parse");
        assert_eq!(kept.body, "old body");
    }

    #[tokio::test]
    async fn rate_limit_suppresses_refreshes_until_reset() {
        let store = MemoryStore::shared();
        seed(&store, 120, "old body").await;
        let cache = cache_over(store);
        let reset = now_unix_seconds() + 600;

        let first = cache
            .serve(
                "feed",
                "alice",
                failing_refresh(
                    GitHubError::new(GitHubErrorKind::RateLimit, "API rate limit exceeded")
                        .with_rate_limit_reset(Some(reset)),
                ),
            )
            .await
            .expect("stale serve should absorb the failure");
        assert_eq!(first.state, CacheState::Stale);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The side channel now short-circuits: stale is served with the
        // reset attached and the refresh closure is never invoked.
        let calls = Arc::new(AtomicUsize::new(0));
        let second = cache
            .serve("feed", "alice", counting_refresh(&calls, "unused"))
            .await
            .expect("suppressed serve");
        assert_eq!(second.state, CacheState::Stale);
        assert_eq!(second.rate_limit_reset, Some(reset));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_path_consults_the_store_before_refreshing() {
        let mut store = crate::cache::store::MockCacheStore::new();
        store.expect_get().times(1).returning(|_| None);
        store
            .expect_put()
            .withf(|key, _, ttl| key == entry_key("feed", "alice") && ttl.is_none())
            .times(1)
            .returning(|_, _, _| ());

        let cache = EdgeCache::new(Arc::new(store), CachePolicy::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let served = cache
            .serve("feed", "alice", counting_refresh(&calls, "body"))
            .await
            .expect("miss should refresh");
        assert_eq!(served.state, CacheState::Miss);
    }

    #[tokio::test]
    async fn unreadable_entries_read_as_misses() {
        let store = MemoryStore::shared();
        store
            .put(&entry_key("feed", "alice"), "not json".to_owned(), None)
            .await;
        let cache = cache_over(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let served = cache
            .serve("feed", "alice", counting_refresh(&calls, "rebuilt"))
            .await
            .expect("should rebuild");
        assert_eq!(served.state, CacheState::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
