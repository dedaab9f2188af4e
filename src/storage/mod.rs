//! Key-value cache with expiration, backing the revocation records.
//!
//! Reads are point-in-time: a distributed backend may answer with a stale
//! value unless it guarantees linearizable reads itself.

mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryStore;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Port for any key-value store supporting a time-to-live.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key` for `ttl`.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Get the live value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` only if `key` holds nothing. Returns whether it was
    /// stored.
    ///
    /// The default implementation is not atomic; backends able to do
    /// better should override it.
    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }

        self.put(key, value, ttl).await?;
        Ok(true)
    }
}

/// Store answering every call with an error.
#[cfg(test)]
pub struct UnavailableStore;

#[cfg(test)]
#[async_trait]
impl CacheStore for UnavailableStore {
    async fn put(&self, _: &str, _: String, _: Duration) -> Result<()> {
        Err(StorageError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _: &str) -> Result<Option<String>> {
        Err(StorageError::Unavailable("connection refused".into()))
    }
}
