//! End-to-end behaviour of the routing and cache-aside layers, wired the way
//! `main` wires them but over in-process stand-ins for MongoDB and Redis.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use unionbase::cache::{CacheConfig, CacheStore, ManualClock, MemoryBackend};
use unionbase::database::{CollectionNamespacer, DatabaseHandle, DatabaseProvider, DatabaseRegistry};
use unionbase::propagation::Propagator;
use unionbase::tenant::{InMemoryDirectory, TenantDirectory, TenantRecord, TenantResolver};
use unionbase::{Error, Result};

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[derive(Debug)]
struct StubDatabase {
    name: String,
}

impl DatabaseHandle for StubDatabase {
    type Collection<T: Send + Sync> = String;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection<T: Send + Sync>(&self, name: &str) -> String {
        format!("{}.{}", self.name, name)
    }
}

#[derive(Default)]
struct StubProvider {
    opened: AtomicUsize,
}

#[async_trait]
impl DatabaseProvider for StubProvider {
    type Handle = StubDatabase;

    fn open(&self, name: &str) -> Result<StubDatabase> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(StubDatabase {
            name: name.to_string(),
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Directory that takes its time answering.
struct SlowDirectory {
    delay: Duration,
}

#[async_trait]
impl TenantDirectory for SlowDirectory {
    async fn find(&self, id: ObjectId) -> Result<Option<TenantRecord>> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(TenantRecord::new(id, "slow_db")))
    }
}

fn registry_with(
    records: &[(ObjectId, &str)],
) -> (Arc<DatabaseRegistry<StubProvider>>, Arc<InMemoryDirectory>) {
    let directory = Arc::new(InMemoryDirectory::new());
    for (id, name) in records {
        directory.insert(TenantRecord::new(*id, *name));
    }
    let resolver = Arc::new(TenantResolver::new(directory.clone()));
    let registry = DatabaseRegistry::new(StubProvider::default(), resolver, Duration::from_secs(5));
    (Arc::new(registry), directory)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Member {
    id: String,
    name: String,
}

fn member() -> Member {
    Member {
        id: "42".into(),
        name: "Ada".into(),
    }
}

fn cache_with_clock() -> (CacheStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let config = CacheConfig::default();
    let backend = MemoryBackend::with_clock(&config, clock.clone());
    (
        CacheStore::new(Arc::new(backend), Propagator::new(2, 64), config),
        clock,
    )
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn resolves_a_tenant_once_and_reuses_the_handle() {
    let acme = ObjectId::new();
    let (registry, directory) = registry_with(&[(acme, "acme_db")]);
    let key = acme.to_hex();

    let first = registry.get_database(&key).await.unwrap();
    assert_eq!(directory.lookups(), 1);
    assert_eq!(first.name(), "acme_db");

    let second = registry.get_database(&key).await.unwrap();
    assert_eq!(directory.lookups(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.opened_count(), 1);
}

#[tokio::test]
async fn cached_entity_expires_after_its_ttl() {
    let (cache, clock) = cache_with_clock();
    let day = Duration::from_secs(24 * 60 * 60);

    cache.set("42", &member(), day).await.unwrap();
    assert_eq!(cache.get::<Member>("42").await, Some(member()));

    clock.advance(Duration::from_secs(25 * 60 * 60));
    assert_eq!(cache.get::<Member>("42").await, None);
    assert!(!cache.exists("42").await.unwrap());
}

#[tokio::test]
async fn background_invalidation_is_eventually_observed() {
    let (cache, _) = cache_with_clock();
    cache
        .set("42", &member(), cache.default_ttl())
        .await
        .unwrap();

    cache.invalidate_in_background(["42"]);

    let mut gone = false;
    for _ in 0..100 {
        if !cache.exists("42").await.unwrap() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gone, "invalidation never landed");
    assert_eq!(cache.get::<Member>("42").await, None);
}

#[tokio::test]
async fn service_override_routes_without_bootstrap_lookup() {
    let (registry, directory) = registry_with(&[]);

    let before = registry
        .get_collection::<Member>("blogs-service", "posts")
        .await;
    assert!(matches!(before, Err(Error::InvalidKey { .. })));
    assert_eq!(directory.lookups(), 0);

    registry
        .resolver()
        .register_service_override("blogs-service", "blog_db");

    let posts = registry
        .get_collection::<Member>("blogs-service", "posts")
        .await
        .unwrap();
    assert_eq!(posts, "blog_db.posts");
    assert_eq!(directory.lookups(), 0);
}

#[tokio::test]
async fn unknown_tenant_is_not_remembered() {
    let ghost = ObjectId::new();
    let (registry, directory) = registry_with(&[]);
    let key = ghost.to_hex();

    for attempt in 1..=2 {
        let result = registry.get_database(&key).await;
        assert!(matches!(result, Err(Error::TenantNotFound { .. })));
        assert_eq!(directory.lookups(), attempt);
    }

    // Provisioned later: the next call finds it.
    directory.insert(TenantRecord::new(ghost, "ghost_db"));
    let db = registry.get_database(&key).await.unwrap();
    assert_eq!(db.name(), "ghost_db");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_opens_one_handle() {
    let acme = ObjectId::new();
    let (registry, _) = registry_with(&[(acme, "acme_db")]);
    let key = acme.to_hex();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            tokio::spawn(async move { registry.get_database(&key).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(registry.provider().opened.load(Ordering::SeqCst), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    assert_eq!(registry.handle_count(), 1);
}

#[tokio::test]
async fn slow_resolution_times_out() {
    let directory = Arc::new(SlowDirectory {
        delay: Duration::from_secs(5),
    });
    let resolver = Arc::new(TenantResolver::new(directory));
    let registry = DatabaseRegistry::new(StubProvider::default(), resolver, Duration::from_secs(5));

    let key = ObjectId::new().to_hex();
    let result = registry
        .get_database_within(&key, Duration::from_millis(20))
        .await;

    match result {
        Err(err @ Error::Timeout { .. }) => assert!(err.is_retryable()),
        other => panic!("expected timeout, got {:?}", other.map(|db| db.name().to_string())),
    }
    assert_eq!(registry.handle_count(), 0);
}

#[tokio::test]
async fn registry_refuses_work_after_shutdown() {
    let acme = ObjectId::new();
    let (registry, _) = registry_with(&[(acme, "acme_db")]);

    registry.get_database(&acme.to_hex()).await.unwrap();
    registry.shutdown().await;

    assert_eq!(registry.handle_count(), 0);
    assert!(matches!(
        registry.get_database(&acme.to_hex()).await,
        Err(Error::ShutDown)
    ));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn partition_names_are_stable_and_distinct(a in any::<[u8; 12]>(), b in any::<[u8; 12]>()) {
        let namespacer = CollectionNamespacer::new();
        let first = ObjectId::from_bytes(a);
        let second = ObjectId::from_bytes(b);

        let name = namespacer.partitioned_collection_for("newscomments", &first);
        prop_assert_eq!(&name, &namespacer.partitioned_collection_for("newscomments", &first));
        prop_assert_eq!(namespacer.parent_of("newscomments", &name), Some(first));

        if a != b {
            prop_assert_ne!(name, namespacer.partitioned_collection_for("newscomments", &second));
        }
    }
}
