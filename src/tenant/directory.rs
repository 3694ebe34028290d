//! Bootstrap directory of tenant records.
//!
//! Every tenant has exactly one record in the shared bootstrap database
//! mapping its identifier to the physical database that holds its data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongodb::{Client, Collection};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// A tenant registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Physical database name. Never changes after registration.
    #[serde(rename = "unionID")]
    pub database_name: String,
}

impl TenantRecord {
    pub fn new(id: ObjectId, database_name: impl Into<String>) -> Self {
        Self {
            id,
            database_name: database_name.into(),
        }
    }
}

/// Lookup of tenant records by identifier.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find(&self, id: ObjectId) -> Result<Option<TenantRecord>>;
}

/// Tenant records stored in the `unions` collection of the bootstrap database.
#[derive(Debug, Clone)]
pub struct MongoTenantDirectory {
    collection: Collection<TenantRecord>,
}

impl MongoTenantDirectory {
    pub fn new(client: &Client, database: &str, collection: &str) -> Self {
        Self {
            collection: client.database(database).collection(collection),
        }
    }

    /// Register a new tenant. Fails if the identifier is already taken.
    pub async fn register(&self, record: &TenantRecord) -> Result<()> {
        self.collection.insert_one(record).await?;
        info!(
            "Registered tenant {} -> {}",
            record.id.to_hex(),
            record.database_name
        );
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for MongoTenantDirectory {
    async fn find(&self, id: ObjectId) -> Result<Option<TenantRecord>> {
        let record = self.collection.find_one(doc! { "_id": id }).await?;
        debug!("Bootstrap lookup for {}: {:?}", id.to_hex(), record.is_some());
        Ok(record)
    }
}

/// Directory held in process memory, for tooling and tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<ObjectId, TenantRecord>>,
    lookups: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns `false` if the identifier was already present.
    pub fn insert(&self, record: TenantRecord) -> bool {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id, record);
        true
    }

    /// Number of `find` calls served so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryDirectory {
    async fn find(&self, id: ObjectId) -> Result<Option<TenantRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_names() {
        let id = ObjectId::new();
        let record = TenantRecord::new(id, "acme_db");
        let doc = mongodb::bson::to_document(&record).unwrap();

        assert_eq!(doc.get_object_id("_id").unwrap(), id);
        assert_eq!(doc.get_str("unionID").unwrap(), "acme_db");
    }

    #[tokio::test]
    async fn test_in_memory_directory() {
        let directory = InMemoryDirectory::new();
        let id = ObjectId::new();

        assert!(directory.insert(TenantRecord::new(id, "acme_db")));
        assert!(!directory.insert(TenantRecord::new(id, "other_db")));

        let found = directory.find(id).await.unwrap().unwrap();
        assert_eq!(found.database_name, "acme_db");
        assert!(directory.find(ObjectId::new()).await.unwrap().is_none());
        assert_eq!(directory.lookups(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_connection_failure() {
        let client = Client::with_uri_str(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=300&directConnection=true",
        )
        .await
        .unwrap();
        let directory = MongoTenantDirectory::new(&client, "unified_base", "unions");

        let err = directory.find(ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::ConnectionFailure { .. }));
        assert!(err.is_retryable());
    }
}
