//! Unionbase service entry point.
//!
//! Wires configuration, MongoDB, the tenant resolver, the cache and the
//! propagation pool together, then runs until Ctrl-C.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use unionbase::cache::{CacheBackend, CacheConfig, CacheStore, MemoryBackend, RedisBackend};
use unionbase::config::{CacheBackendKind, Config};
use unionbase::database::{DatabaseRegistry, MongoProvider};
use unionbase::propagation::Propagator;
use unionbase::state::AppState;
use unionbase::tenant::TenantResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("unionbase=info,mongodb=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting unionbase...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    // Connect to MongoDB
    info!("Connecting to MongoDB...");
    let provider = MongoProvider::connect(&config).await?;
    let directory = Arc::new(provider.tenant_directory(&config.tenant_collection));

    let resolver = Arc::new(
        TenantResolver::new(directory).with_service_overrides(config.service_overrides.clone()),
    );
    let registry = Arc::new(DatabaseRegistry::new(
        provider,
        Arc::clone(&resolver),
        config.resolve_timeout,
    ));
    info!("Database registry initialized");

    // Cache
    let cache_config = CacheConfig::with_capacity(config.cache_max_capacity).ttl(config.cache_ttl);
    let backend: Arc<dyn CacheBackend> = match config.cache_backend {
        CacheBackendKind::Redis => Arc::new(RedisBackend::connect(&config.redis_url()).await?),
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new(&cache_config)),
    };
    info!("Cache backend: {}", backend.name());

    let propagator = Propagator::new(config.propagation_workers, config.propagation_queue);
    let cache = CacheStore::new(backend, propagator, cache_config);

    let state = AppState::new(registry, cache, &config.tenant_collection);
    info!("Repositories ready");

    if let Err(e) = state.registry.health_check().await {
        warn!("Primary store health check failed: {}", e);
    }
    if let Err(e) = state.cache.health_check().await {
        warn!("Cache health check failed: {}", e);
    }

    info!("Unionbase is running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    state.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
