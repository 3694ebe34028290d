//! Configuration module for unionbase.
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Which key-value store backs the cache-aside layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheBackendKind {
    #[default]
    Redis,
    Memory,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown CACHE_BACKEND '{}'", other))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_username: Option<String>,
    pub mongodb_password: Option<String>,

    /// Shared database holding the tenant records.
    pub bootstrap_database: String,
    pub tenant_collection: String,

    /// Static service key -> database name mappings, registered at boot.
    pub service_overrides: Vec<(String, String)>,

    /// Deadline applied to tenant resolution and handle acquisition.
    pub resolve_timeout: Duration,

    // Cache
    pub cache_backend: CacheBackendKind,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,

    // Background propagation
    pub propagation_workers: usize,
    pub propagation_queue: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns `Error::Config` if a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cache_backend = match non_empty("CACHE_BACKEND") {
            Some(raw) => raw.parse::<CacheBackendKind>()?,
            None => CacheBackendKind::default(),
        };

        let service_overrides = parse_overrides(
            &env::var("SERVICE_OVERRIDES").unwrap_or_else(|_| "blogs=blog".to_string()),
        )?;

        Ok(Self {
            mongodb_uri: env::var("MONGODB_URI")
                .map_err(|_| Error::Config("MONGODB_URI must be set".to_string()))?,
            mongodb_username: non_empty("MONGODB_USERNAME"),
            mongodb_password: non_empty("MONGODB_PASSWORD"),
            bootstrap_database: env::var("BOOTSTRAP_DATABASE")
                .unwrap_or_else(|_| "unified_base".to_string()),
            tenant_collection: env::var("TENANT_COLLECTION")
                .unwrap_or_else(|_| "unions".to_string()),
            service_overrides,
            resolve_timeout: Duration::from_millis(parse_var("RESOLVE_TIMEOUT_MS", 10_000)?),
            cache_backend,
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            redis_port: parse_var("REDIS_PORT", 6379)?,
            redis_password: non_empty("REDIS_PASSWORD"),
            cache_ttl: Duration::from_secs(parse_var("CACHE_TTL_SECS", 24 * 60 * 60)?),
            cache_max_capacity: parse_var("CACHE_MAX_CAPACITY", 100_000)?,
            propagation_workers: parse_var("PROPAGATION_WORKERS", 4)?,
            propagation_queue: parse_var("PROPAGATION_QUEUE", 1024)?,
        })
    }

    /// Connection URL for the Redis cache.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/",
                password, self.redis_host, self.redis_port
            ),
            None => format!("redis://{}:{}/", self.redis_host, self.redis_port),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value '{}'", name, raw))),
        _ => Ok(default),
    }
}

/// Parse `key=db,key=db` pairs. Blank input yields no overrides.
fn parse_overrides(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, db)) if !key.trim().is_empty() && !db.trim().is_empty() => {
                Ok((key.trim().to_string(), db.trim().to_string()))
            }
            _ => Err(Error::Config(format!(
                "SERVICE_OVERRIDES entry '{}' must look like key=database",
                pair
            ))),
        })
        .collect()
}
