//! Database module - tenant routing onto physical MongoDB databases.
//!
//! - `registry` - one lazily opened handle per physical database
//! - `namespace` - logical and partitioned collection names
//! - `mongo` - MongoDB provider and handle
//! - `models` / `repository` - documents and their data access

pub mod models;
pub mod mongo;
pub mod namespace;
pub mod registry;
pub mod repository;

pub use mongo::{MongoHandle, MongoProvider};
pub use namespace::CollectionNamespacer;
pub use registry::{DatabaseHandle, DatabaseProvider, DatabaseRegistry};
