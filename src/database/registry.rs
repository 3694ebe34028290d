//! Database handle registry.
//!
//! Owns one handle per physical database, created lazily on first access and
//! shared by every caller afterwards. Population uses double-checked locking:
//! lookups take the shared lock, and only the populate path takes the
//! exclusive lock, never across an await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::namespace::CollectionNamespacer;
use crate::error::{Error, Result};
use crate::tenant::TenantResolver;

/// An opened physical database.
pub trait DatabaseHandle: Send + Sync + 'static {
    type Collection<T: Send + Sync>;

    /// Physical database name.
    fn name(&self) -> &str;

    fn collection<T: Send + Sync>(&self, name: &str) -> Self::Collection<T>;
}

/// Opens handles onto physical databases.
#[async_trait]
pub trait DatabaseProvider: Send + Sync + 'static {
    type Handle: DatabaseHandle;

    /// Bind a handle to `name`. Called at most once per name by the registry,
    /// while it holds the exclusive lock, so it must not block.
    fn open(&self, name: &str) -> Result<Self::Handle>;

    /// Verify the primary store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Release underlying connections.
    async fn close(&self) {}
}

struct RegistryState<H> {
    by_key: HashMap<String, Arc<H>>,
    by_name: HashMap<String, Arc<H>>,
    shut_down: bool,
}

impl<H> Default for RegistryState<H> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
            by_name: HashMap::new(),
            shut_down: false,
        }
    }
}

/// Tenant-aware access to databases and collections.
pub struct DatabaseRegistry<P: DatabaseProvider> {
    provider: P,
    resolver: Arc<TenantResolver>,
    namespacer: CollectionNamespacer,
    state: RwLock<RegistryState<P::Handle>>,
    resolve_timeout: Duration,
    opened: AtomicU64,
}

impl<P: DatabaseProvider> DatabaseRegistry<P> {
    pub fn new(provider: P, resolver: Arc<TenantResolver>, resolve_timeout: Duration) -> Self {
        Self {
            provider,
            resolver,
            namespacer: CollectionNamespacer::new(),
            state: RwLock::new(RegistryState::default()),
            resolve_timeout,
            opened: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn resolver(&self) -> &Arc<TenantResolver> {
        &self.resolver
    }

    pub fn namespacer(&self) -> &CollectionNamespacer {
        &self.namespacer
    }

    /// Get the database for a tenant key, bounded by the configured timeout.
    pub async fn get_database(&self, key: &str) -> Result<Arc<P::Handle>> {
        self.get_database_within(key, self.resolve_timeout).await
    }

    /// Get the database for a tenant key, failing with `Error::Timeout` once
    /// `timeout` elapses. Dropping the future abandons the acquisition.
    pub async fn get_database_within(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Arc<P::Handle>> {
        match tokio::time::timeout(timeout, self.acquire(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Acquiring database for '{}' timed out after {:?}", key, timeout);
                Err(Error::Timeout {
                    key: key.to_string(),
                    after: timeout,
                })
            }
        }
    }

    async fn acquire(&self, key: &str) -> Result<Arc<P::Handle>> {
        {
            let state = self.state.read();
            if state.shut_down {
                return Err(Error::ShutDown);
            }
            if let Some(handle) = state.by_key.get(key) {
                return Ok(Arc::clone(handle));
            }
        }

        let db_name = self.resolver.resolve(key).await?;

        let mut state = self.state.write();
        if state.shut_down {
            return Err(Error::ShutDown);
        }

        // Another caller may have raced ahead while we were resolving.
        if let Some(handle) = state.by_key.get(key) {
            return Ok(Arc::clone(handle));
        }

        // Same physical database reached through a different key.
        if let Some(handle) = state.by_name.get(&db_name).cloned() {
            debug!("Reusing handle for {} under key {}", db_name, key);
            state.by_key.insert(key.to_string(), Arc::clone(&handle));
            return Ok(handle);
        }

        let handle = Arc::new(self.provider.open(&db_name)?);
        self.opened.fetch_add(1, Ordering::Relaxed);
        state.by_name.insert(db_name.clone(), Arc::clone(&handle));
        state.by_key.insert(key.to_string(), Arc::clone(&handle));

        info!("Opened database {} for key {}", db_name, key);
        Ok(handle)
    }

    /// Get a collection in the tenant's database.
    pub async fn get_collection<T: Send + Sync>(
        &self,
        key: &str,
        logical: &str,
    ) -> Result<<P::Handle as DatabaseHandle>::Collection<T>> {
        let db = self.get_database(key).await?;
        Ok(db.collection(&self.namespacer.collection_for(logical)))
    }

    /// Get the partition of `logical` owned by `parent` in the tenant's database.
    pub async fn get_partitioned_collection<T: Send + Sync>(
        &self,
        key: &str,
        logical: &str,
        parent: &ObjectId,
    ) -> Result<<P::Handle as DatabaseHandle>::Collection<T>> {
        let db = self.get_database(key).await?;
        Ok(db.collection(&self.namespacer.partitioned_collection_for(logical, parent)))
    }

    /// Drop the handle and resolved name held for `key`, so the next call
    /// resolves it again. The physical handle is released once no other key
    /// refers to it. Returns `true` if anything was held.
    pub fn forget(&self, key: &str) -> bool {
        let released = {
            let mut state = self.state.write();
            match state.by_key.remove(key) {
                Some(handle) => {
                    let shared = state.by_key.values().any(|h| Arc::ptr_eq(h, &handle));
                    if !shared {
                        state.by_name.remove(handle.name());
                    }
                    true
                }
                None => false,
            }
        };

        let resolved = self.resolver.forget(key);
        if released || resolved {
            debug!("Forgot database for key {}", key);
        }
        released || resolved
    }

    pub async fn health_check(&self) -> Result<()> {
        self.provider.ping().await
    }

    /// Number of distinct physical databases currently held.
    pub fn handle_count(&self) -> usize {
        self.state.read().by_name.len()
    }

    /// Number of handles opened over the registry's lifetime.
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Release every handle and close the provider. Later calls fail with
    /// `Error::ShutDown`.
    pub async fn shutdown(&self) {
        let released = {
            let mut state = self.state.write();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.by_key.clear();
            let released = state.by_name.len();
            state.by_name.clear();
            released
        };

        self.resolver.clear();
        self.provider.close().await;
        info!("Database registry shut down ({} handles released)", released);
    }
}

impl<P: DatabaseProvider> std::fmt::Debug for DatabaseRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("DatabaseRegistry")
            .field("databases", &state.by_name.keys().collect::<Vec<_>>())
            .field("keys", &state.by_key.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::tenant::{InMemoryDirectory, TenantRecord};

    #[derive(Debug)]
    struct FakeDb {
        name: String,
    }

    impl DatabaseHandle for FakeDb {
        type Collection<T: Send + Sync> = String;

        fn name(&self) -> &str {
            &self.name
        }

        fn collection<T: Send + Sync>(&self, name: &str) -> String {
            format!("{}.{}", self.name, name)
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        opened: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DatabaseProvider for FakeProvider {
        type Handle = FakeDb;

        fn open(&self, name: &str) -> Result<FakeDb> {
            if self.fail {
                return Err(Error::connection(name, "refused"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeDb {
                name: name.to_string(),
            })
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn registry(
        provider: FakeProvider,
        records: &[(ObjectId, &str)],
    ) -> (DatabaseRegistry<FakeProvider>, Arc<InMemoryDirectory>) {
        let directory = Arc::new(InMemoryDirectory::new());
        for (id, name) in records {
            directory.insert(TenantRecord::new(*id, *name));
        }
        let resolver = Arc::new(TenantResolver::new(directory.clone()));
        (
            DatabaseRegistry::new(provider, resolver, Duration::from_secs(5)),
            directory,
        )
    }

    #[tokio::test]
    async fn test_handle_is_reused() {
        let id = ObjectId::new();
        let (registry, _) = registry(FakeProvider::default(), &[(id, "acme_db")]);

        let first = registry.get_database(&id.to_hex()).await.unwrap();
        let second = registry.get_database(&id.to_hex()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "acme_db");
        assert_eq!(registry.provider().opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_first_access_opens_once() {
        let id = ObjectId::new();
        let (registry, _) = registry(FakeProvider::default(), &[(id, "acme_db")]);
        let registry = Arc::new(registry);
        let key = id.to_hex();

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let key = key.clone();
                tokio::spawn(async move { registry.get_database(&key).await.unwrap() })
            })
            .collect();

        let handles: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(registry.provider().opened.load(Ordering::SeqCst), 1);
        assert_eq!(registry.opened_count(), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test]
    async fn test_keys_sharing_a_database_share_the_handle() {
        let id = ObjectId::new();
        let (registry, _) = registry(FakeProvider::default(), &[(id, "shared_db")]);
        registry
            .resolver()
            .register_service_override("reports", "shared_db");

        let by_id = registry.get_database(&id.to_hex()).await.unwrap();
        let by_service = registry.get_database("reports").await.unwrap();

        assert!(Arc::ptr_eq(&by_id, &by_service));
        assert_eq!(registry.handle_count(), 1);
    }

    #[tokio::test]
    async fn test_forget_forces_resolution_again() {
        let id = ObjectId::new();
        let (registry, directory) = registry(FakeProvider::default(), &[(id, "acme_db")]);
        let key = id.to_hex();

        let first = registry.get_database(&key).await.unwrap();
        assert_eq!(directory.lookups(), 1);

        assert!(registry.forget(&key));
        assert_eq!(registry.handle_count(), 0);
        assert!(registry.resolver().cached_name(&key).is_none());

        let second = registry.get_database(&key).await.unwrap();
        assert_eq!(directory.lookups(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.opened_count(), 2);

        assert!(!registry.forget("never-seen"));
    }

    #[tokio::test]
    async fn test_forget_keeps_handle_shared_with_another_key() {
        let id = ObjectId::new();
        let (registry, _) = registry(FakeProvider::default(), &[(id, "shared_db")]);
        registry
            .resolver()
            .register_service_override("reports", "shared_db");

        let by_id = registry.get_database(&id.to_hex()).await.unwrap();
        registry.get_database("reports").await.unwrap();

        assert!(registry.forget("reports"));
        assert_eq!(registry.handle_count(), 1);

        // Re-acquired through the surviving key's handle.
        let again = registry.get_database("reports").await.unwrap();
        assert!(Arc::ptr_eq(&by_id, &again));
        assert_eq!(registry.opened_count(), 1);
    }

    #[tokio::test]
    async fn test_resolution_errors_propagate() {
        let (registry, directory) = registry(FakeProvider::default(), &[]);

        assert!(matches!(
            registry.get_database("nonsense").await,
            Err(Error::InvalidKey { .. })
        ));

        let missing = ObjectId::new().to_hex();
        assert!(matches!(
            registry.get_database(&missing).await,
            Err(Error::TenantNotFound { .. })
        ));
        assert!(matches!(
            registry.get_database(&missing).await,
            Err(Error::TenantNotFound { .. })
        ));
        assert_eq!(directory.lookups(), 2);
        assert_eq!(registry.handle_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces() {
        let id = ObjectId::new();
        let provider = FakeProvider {
            fail: true,
            ..Default::default()
        };
        let (registry, _) = registry(provider, &[(id, "acme_db")]);

        let err = registry.get_database(&id.to_hex()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailure { .. }));
        assert!(err.is_retryable());
        assert_eq!(registry.handle_count(), 0);
    }

    #[tokio::test]
    async fn test_collections() {
        let id = ObjectId::new();
        let parent = ObjectId::new();
        let (registry, _) = registry(FakeProvider::default(), &[(id, "acme_db")]);
        let key = id.to_hex();

        let news: String = registry.get_collection::<()>(&key, "news").await.unwrap();
        assert_eq!(news, "acme_db.news");

        let comments: String = registry
            .get_partitioned_collection::<()>(&key, "newscomments", &parent)
            .await
            .unwrap();
        assert_eq!(comments, format!("acme_db.newscomments_{}", parent.to_hex()));
    }

    #[tokio::test]
    async fn test_shutdown_releases_handles() {
        let id = ObjectId::new();
        let (registry, _) = registry(FakeProvider::default(), &[(id, "acme_db")]);
        let key = id.to_hex();

        registry.get_database(&key).await.unwrap();
        assert_eq!(registry.handle_count(), 1);

        registry.shutdown().await;
        assert_eq!(registry.handle_count(), 0);
        assert!(registry.resolver().cached_name(&key).is_none());
        assert!(matches!(
            registry.get_database(&key).await,
            Err(Error::ShutDown)
        ));

        // Idempotent.
        registry.shutdown().await;
    }
}
