//! Tenant key resolution with a process-local name cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{TenantDirectory, parse_tenant_id};
use crate::error::{Error, Result};

/// Maps tenant keys to physical database names.
///
/// Resolution order:
/// 1. resolved-name cache (no I/O)
/// 2. service overrides registered at boot
/// 3. bootstrap directory lookup by identifier
///
/// Only successful directory lookups are cached. A failed lookup is retried
/// on the next call, since tenants may be provisioned at any time.
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    resolved: RwLock<HashMap<String, String>>,
    overrides: RwLock<HashMap<String, String>>,
    lookups: AtomicU64,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            directory,
            resolved: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
            lookups: AtomicU64::new(0),
        }
    }

    /// Register several overrides at once (builder pattern).
    #[must_use]
    pub fn with_service_overrides<I, K, V>(self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, db_name) in overrides {
            self.register_service_override(key, db_name);
        }
        self
    }

    /// Route a static service key to a shared database.
    ///
    /// Must run before the first resolution of `key`.
    pub fn register_service_override(&self, key: impl Into<String>, db_name: impl Into<String>) {
        let key = key.into();
        let db_name = db_name.into();
        info!("Service override: {} -> {}", key, db_name);
        self.overrides.write().insert(key, db_name);
    }

    pub fn service_override(&self, key: &str) -> Option<String> {
        self.overrides.read().get(key).cloned()
    }

    /// Previously resolved name for `key`, without any I/O.
    pub fn cached_name(&self, key: &str) -> Option<String> {
        self.resolved.read().get(key).cloned()
    }

    pub async fn resolve(&self, key: &str) -> Result<String> {
        if let Some(name) = self.cached_name(key) {
            return Ok(name);
        }

        if let Some(name) = self.service_override(key) {
            return Ok(name);
        }

        let id = parse_tenant_id(key)?;

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let record = self
            .directory
            .find(id)
            .await?
            .ok_or_else(|| Error::TenantNotFound {
                key: key.to_string(),
            })?;

        debug!("Resolved tenant {} -> {}", key, record.database_name);
        self.resolved
            .write()
            .insert(key.to_string(), record.database_name.clone());

        Ok(record.database_name)
    }

    /// Drop the cached name for `key`. Returns `true` if one was present.
    pub fn forget(&self, key: &str) -> bool {
        self.resolved.write().remove(key).is_some()
    }

    /// Drop every cached name. Overrides are kept.
    pub fn clear(&self) {
        self.resolved.write().clear();
    }

    /// Number of bootstrap directory queries issued.
    pub fn bootstrap_lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantResolver")
            .field("resolved", &self.resolved.read().len())
            .field("overrides", &self.overrides.read().len())
            .field("bootstrap_lookups", &self.bootstrap_lookups())
            .finish()
    }
}
