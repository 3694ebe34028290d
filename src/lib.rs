//! Unionbase - tenant-aware resource routing for multi-tenant union services.
//!
//! Every tenant ("union") owns an isolated MongoDB database. This crate turns
//! an opaque tenant key into the right database handle, exactly once per
//! physical database, and keeps a read-through cache loosely consistent with
//! the primary store without making requests wait on cache writes.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `tenant` - Tenant key resolution and static service overrides
//! - `database` - Handle registry, collection namespacing, MongoDB provider,
//!   repositories
//! - `cache` - Cache-aside store over Redis or an in-process Moka cache
//! - `propagation` - Bounded worker pool for background cache writes
//! - `state` - Repositories and shared services wired together
//! - `error` - Crate error type

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod propagation;
pub mod state;
pub mod tenant;

pub use cache::{CacheBackend, CacheConfig, CacheStore, MemoryBackend, RedisBackend};
pub use config::{CacheBackendKind, Config};
pub use database::{CollectionNamespacer, DatabaseRegistry, MongoProvider};
pub use error::{Error, Result};
pub use propagation::{PropagationStats, Propagator};
pub use state::AppState;
pub use tenant::{TenantDirectory, TenantRecord, TenantResolver};
