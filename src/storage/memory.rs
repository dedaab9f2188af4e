//! In-process cache store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheStore, Result};

const PURGE_EVERY: u64 = 1024; // insertions.

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` when the ttl goes beyond what [`Instant`] can hold.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// Cache store kept in memory. Expired entries are hidden on read and
/// dropped periodically on write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    insertions: AtomicU64,
}

impl MemoryStore {
    /// Create a new [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn maybe_purge(&self) {
        if self.insertions.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY
            == PURGE_EVERY - 1
        {
            let removed = self.purge().await;
            tracing::trace!(removed, "purged expired cache entries");
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let entry = Entry::new(value, Instant::now(), ttl);
        self.entries.write().await.insert(key.to_owned(), entry);
        self.maybe_purge().await;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(key.to_owned(), Entry::new(value, now, ttl));
        drop(entries);
        self.maybe_purge().await;

        Ok(true)
    }
}
