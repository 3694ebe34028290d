//! Cache-aside store for serializable entities.
//!
//! Reads go through `get` (a failure there counts as a miss). Population after
//! a miss and invalidation after a write are handed to the propagation pool
//! and never awaited by the request; their failures are logged, not returned.
//! A reader racing a write may see the old value until the invalidation lands
//! or the entry expires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::config::CacheConfig;
use crate::error::Result;
use crate::propagation::Propagator;

/// Typed access to a key-value cache. Values are stored as JSON.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    propagator: Propagator,
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, propagator: Propagator, config: CacheConfig) -> Self {
        Self {
            backend,
            propagator,
            config,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// Cached value for `key`, or `None` on miss, expiry, or any cache failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read for '{}' failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    /// Like `get`, but reports backend and decoding failures.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.backend.get(key).await? else {
            debug!("Cache miss: {}", key);
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw, ttl).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    /// Remove `key`. A no-op if absent.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    /// Reset the lifetime of `key`. Returns `false` if absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.backend.expire(key, ttl).await
    }

    /// Every element cached under `key`; empty on miss or failure.
    /// Elements that fail to decode are skipped.
    pub async fn list_get<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.backend.list_range(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache list read for '{}' failed, treating as miss: {}", key, e);
                return Vec::new();
            }
        };

        raw.iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Skipping undecodable element in '{}': {}", key, e);
                    None
                }
            })
            .collect()
    }

    /// Append `values` to the list under `key`.
    pub async fn list_push<T: Serialize>(&self, key: &str, values: &[T]) -> Result<()> {
        let raw = values
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.backend.list_push(key, raw).await
    }

    /// Populate `key` with the default TTL without waiting.
    pub fn populate_in_background<T: Serialize + ?Sized>(&self, key: impl Into<String>, value: &T) {
        self.populate_in_background_for(key, value, self.config.default_ttl);
    }

    /// Populate `key` with `ttl` without waiting. The value is serialized up
    /// front so the caller keeps ownership.
    pub fn populate_in_background_for<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) {
        let key = key.into();
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Not caching '{}': {}", key, e);
                return;
            }
        };

        let backend = Arc::clone(&self.backend);
        let label = format!("populate {}", key);
        self.propagator.submit(label, async move {
            backend.set(&key, raw, ttl).await
        });
    }

    /// Remove every key without waiting. Each key is its own task, so one
    /// failure does not keep the others cached.
    pub fn invalidate_in_background<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            let key = key.into();
            let backend = Arc::clone(&self.backend);
            let label = format!("invalidate {}", key);
            self.propagator.submit(label, async move { backend.delete(&key).await });
        }
    }

    /// Read-through: serve `key` from cache, or call `load` and populate the
    /// cache in the background when it finds something.
    pub async fn read_through<T, F, Fut>(&self, key: &str, load: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if let Some(hit) = self.get(key).await {
            debug!("Cache hit: {}", key);
            return Ok(Some(hit));
        }

        let loaded = load().await?;
        if let Some(value) = &loaded {
            self.populate_in_background(key, value);
        }
        Ok(loaded)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.backend.ping().await
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("propagator", &self.propagator)
            .finish()
    }
}
