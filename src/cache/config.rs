//! Cache configuration.

use std::time::Duration;

/// Reference entry lifetime: entities stay cached for a day.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for a cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime applied by background population.
    /// Expiry is fixed at write time; reads never extend it.
    pub default_ttl: Duration,

    /// Maximum number of entries held by the in-process backend.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_capacity: 100_000,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with the given max capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set the default time-to-live.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.default_ttl = duration;
        self
    }

    /// Set max capacity (builder pattern).
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }
}
