//! Key-value store behind the cache-aside layer.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Flat string-keyed store with per-key expiry and list values.
///
/// Any error is reported as `Error::CacheUnavailable`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Unexpired value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value`, replacing any previous entry, expiring `ttl` from now.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Reset the expiry of `key` to `ttl` from now. Returns `false` if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Append to the list under `key`, creating it if needed.
    async fn list_push(&self, key: &str, values: Vec<String>) -> Result<()>;

    /// Every element of the list under `key`, in insertion order.
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}
