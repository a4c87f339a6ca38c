//! Shared cache store abstraction.
//!
//! The edge cache, the revalidation lease, the rate-limit side channel, and
//! the resolvers' cross-run caches all sit behind [`CacheStore`]: a string
//! key-value store with optional per-entry TTL. Entries are immutable values
//! replaced wholesale, so concurrent writers race safely (last write wins).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A key-value store with optional expiry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, expiring after `ttl` when given.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>);
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-process [`CacheStore`] for a single point of presence.
///
/// Expired entries are dropped lazily on read and opportunistically purged
/// on write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store behind an [`Arc`], ready for sharing.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: upgrade to a write lock to drop it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: ttl.map(|duration| now + duration),
            },
        );
    }
}
