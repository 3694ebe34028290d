//! Tenant resolution: opaque tenant keys to physical database names.

mod directory;
mod resolver;

use mongodb::bson::oid::ObjectId;

use crate::error::{Error, Result};

pub use directory::{InMemoryDirectory, MongoTenantDirectory, TenantDirectory, TenantRecord};
pub use resolver::TenantResolver;

/// Parse a tenant key as the hex form of a tenant identifier.
pub fn parse_tenant_id(key: &str) -> Result<ObjectId> {
    ObjectId::parse_str(key).map_err(|e| Error::invalid_key(key, e))
}
