//! Cache module - cache-aside layer over a key-value store.
//!
//! ## Architecture
//!
//! - `CacheBackend` - flat string-keyed store (Redis in production, Moka in process)
//! - `CacheStore` - typed JSON values with TTL, plus background population and
//!   invalidation through the propagation pool
//! - `Clock` - time source for the in-process backend's expiry
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Read-through
//! let union = cache
//!     .read_through(&id.to_hex(), || repo.find_union(id))
//!     .await?;
//!
//! // Write-invalidate
//! cache.invalidate_in_background([id.to_hex(), union.slug.clone()]);
//! ```

mod backend;
mod clock;
mod config;
mod memory;
mod redis_backend;
mod store;

pub use backend::CacheBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, DEFAULT_TTL};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use store::CacheStore;
