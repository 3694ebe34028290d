//! In-process cache backend built on Moka.
//!
//! Moka bounds the entry count; expiry is tracked per entry as an absolute
//! instant against an injectable clock so that tests can move time forward.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::ops::compute::Op;
use moka::sync::Cache;

use super::backend::CacheBackend;
use super::clock::{Clock, SystemClock, expiry_after};
use super::config::CacheConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Stored {
    Scalar(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Bounded in-process key-value store.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Cache<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Cache::builder().max_capacity(config.max_capacity).build(),
            clock,
        }
    }

    /// Live entry under `key`; expired entries are evicted on the way.
    fn live(&self, key: &str) -> Option<Entry> {
        let entry = self.inner.get(key)?;
        let now = self.clock.now();
        if !entry.is_expired(now) {
            return Some(entry);
        }

        // Re-checked under the entry lock: a concurrent `set` may have
        // replaced the expired value already.
        self.inner
            .entry(key.to_string())
            .and_compute_with(|existing| match existing.map(|e| e.into_value()) {
                Some(current) if current.is_expired(now) => Op::Remove,
                _ => Op::Nop,
            });
        None
    }

    /// Get the number of entries, including expired ones not yet evicted.
    ///
    /// Note: This may not be perfectly accurate due to concurrent operations.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

fn wrong_type(key: &str) -> Error {
    Error::cache(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.live(key) {
            Some(Entry {
                value: Stored::Scalar(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires_at = expiry_after(self.clock.now(), ttl);
        self.inner.insert(
            key.to_string(),
            Entry {
                value: Stored::Scalar(value),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.invalidate(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut found = false;
        self.inner
            .entry(key.to_string())
            .and_compute_with(|existing| {
                match existing.map(|e| e.into_value()) {
                    Some(mut entry) if !entry.is_expired(now) => {
                        found = true;
                        entry.expires_at = Some(expiry_after(now, ttl));
                        Op::Put(entry)
                    }
                    Some(_) => Op::Remove,
                    None => Op::Nop,
                }
            });
        Ok(found)
    }

    async fn list_push(&self, key: &str, values: Vec<String>) -> Result<()> {
        let now = self.clock.now();
        let mut conflict = false;
        self.inner
            .entry(key.to_string())
            .and_upsert_with(|existing| match existing.map(|e| e.into_value()) {
                Some(Entry {
                    value: Stored::List(mut items),
                    expires_at,
                }) if !expires_at.is_some_and(|at| now >= at) => {
                    items.extend(values);
                    Entry {
                        value: Stored::List(items),
                        expires_at,
                    }
                }
                Some(entry) if !entry.is_expired(now) => {
                    conflict = true;
                    entry
                }
                _ => Entry {
                    value: Stored::List(values),
                    expires_at: None,
                },
            });

        if conflict {
            return Err(wrong_type(key));
        }
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        match self.live(key) {
            Some(Entry {
                value: Stored::List(items),
                ..
            }) => Ok(items),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entry_count", &self.inner.entry_count())
            .field("clock", &self.clock)
            .finish()
    }
}
