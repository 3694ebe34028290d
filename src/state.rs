//! Shared application state.
//!
//! Built once in `main` and cloned into whatever serves requests.

use std::sync::Arc;

use tracing::info;

use crate::cache::CacheStore;
use crate::database::repository::{BlogRepository, NewsRepository, UnionRepository};
use crate::database::{DatabaseRegistry, MongoProvider};

#[derive(Clone)]
pub struct AppState {
    /// Tenant-aware database access.
    pub registry: Arc<DatabaseRegistry<MongoProvider>>,

    /// Cache-aside store; owns the propagation pool.
    pub cache: CacheStore,

    pub unions: Arc<UnionRepository>,
    pub news: Arc<NewsRepository>,
    pub blogs: Arc<BlogRepository>,
}

impl AppState {
    pub fn new(
        registry: Arc<DatabaseRegistry<MongoProvider>>,
        cache: CacheStore,
        tenant_collection: &str,
    ) -> Self {
        let unions = Arc::new(UnionRepository::new(
            Arc::clone(&registry),
            tenant_collection,
            cache.clone(),
        ));
        let news = Arc::new(NewsRepository::new(Arc::clone(&registry)));
        let blogs = Arc::new(BlogRepository::new(Arc::clone(&registry), cache.clone()));

        Self {
            registry,
            cache,
            unions,
            news,
            blogs,
        }
    }

    /// Drain pending cache writes, then release every database handle.
    pub async fn shutdown(&self) {
        self.cache.propagator().shutdown().await;
        self.registry.shutdown().await;
        info!("Application state released");
    }
}
