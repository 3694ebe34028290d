//! Union repository.
//!
//! Unions live in the bootstrap database. Each union is cached under its id
//! (hex) and its slug, and the full listing under `all-unions`.

use std::sync::Arc;

use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Document, doc};
use mongodb::options::{FindOptions, ReturnDocument};
use tracing::debug;

use crate::cache::CacheStore;
use crate::database::models::Union;
use crate::database::models::union::slugify;
use crate::database::mongo::MongoProvider;
use crate::database::registry::{DatabaseHandle, DatabaseRegistry};
use crate::error::{Error, Result};

/// Cache key of the full union listing.
pub const ALL_UNIONS_KEY: &str = "all-unions";

/// Fields fixed when a union is registered. `unionID` names its database.
const IMMUTABLE_FIELDS: [&str; 2] = ["_id", "unionID"];

/// Reject changes touching a field that must not move after registration.
fn checked_changes(changes: Document) -> Result<Document> {
    match IMMUTABLE_FIELDS.iter().find(|field| changes.contains_key(**field)) {
        Some(field) => Err(Error::ImmutableField {
            field: field.to_string(),
        }),
        None => Ok(changes),
    }
}

pub struct UnionRepository {
    registry: Arc<DatabaseRegistry<MongoProvider>>,
    collection: Collection<Union>,
    cache: CacheStore,
}

impl UnionRepository {
    pub fn new(
        registry: Arc<DatabaseRegistry<MongoProvider>>,
        collection: &str,
        cache: CacheStore,
    ) -> Self {
        let collection: Collection<Union> =
            registry.provider().base_database().collection(collection);
        Self {
            registry,
            collection,
            cache,
        }
    }

    /// Cache keys under which `union` may be visible.
    fn cache_keys(union: &Union) -> Vec<String> {
        let mut keys = Vec::with_capacity(3);
        if let Some(id) = union.id {
            keys.push(id.to_hex());
        }
        keys.push(union.union_id.clone());
        keys.push(ALL_UNIONS_KEY.to_string());
        keys
    }

    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<Union>> {
        let collection = self.collection.clone();
        self.cache
            .read_through(&id.to_hex(), || async move {
                Ok::<_, Error>(collection.find_one(doc! { "_id": id }).await?)
            })
            .await
    }

    /// Find a live union by display name; lookups are by slug, so case and
    /// spacing do not matter.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Union>> {
        let slug = slugify(name);
        let collection = self.collection.clone();
        let filter = doc! { "unionID": &slug, "deleted": false };
        self.cache
            .read_through(&slug, || async move { Ok::<_, Error>(collection.find_one(filter).await?) })
            .await
    }

    /// Every live union, served from the `all-unions` cache entry when present.
    pub async fn list_all(&self) -> Result<Vec<Union>> {
        if let Some(unions) = self.cache.get::<Vec<Union>>(ALL_UNIONS_KEY).await {
            return Ok(unions);
        }

        let unions: Vec<Union> = self
            .collection
            .find(doc! { "deleted": false })
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        self.cache.populate_in_background(ALL_UNIONS_KEY, &unions);
        Ok(unions)
    }

    /// One page of unions matching `filter` plus the total match count.
    /// Pages are read from the database directly.
    pub async fn page(&self, filter: Document, page: u64, limit: i64) -> Result<(Vec<Union>, u64)> {
        let total = self.collection.count_documents(filter.clone()).await?;

        let options = FindOptions::builder()
            .skip(super::skip_for(page, limit))
            .limit(limit)
            .sort(doc! { "createdOn": -1 })
            .build();

        let unions = self
            .collection
            .find(filter)
            .with_options(options)
            .await?
            .try_collect()
            .await?;

        Ok((unions, total))
    }

    /// Insert a new union. Its id and slug entries are cached right away.
    pub async fn register(&self, mut union: Union) -> Result<Union> {
        let result = self.collection.insert_one(&union).await?;
        union.id = result.inserted_id.as_object_id();
        debug!("Registered union {} ({:?})", union.union_id, union.id);

        if let Some(id) = union.id {
            self.cache.populate_in_background(id.to_hex(), &union);
        }
        self.cache
            .populate_in_background(union.union_id.clone(), &union);
        self.cache.invalidate_in_background([ALL_UNIONS_KEY]);

        Ok(union)
    }

    /// Apply `$set: changes` and return the updated union.
    ///
    /// # Errors
    /// Returns `Error::ImmutableField` if `changes` touches `_id` or `unionID`.
    pub async fn modify(&self, id: ObjectId, changes: Document) -> Result<Option<Union>> {
        let changes = checked_changes(changes)?;

        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": changes })
            .return_document(ReturnDocument::After)
            .await?;

        match &updated {
            Some(union) => self.cache.invalidate_in_background(Self::cache_keys(union)),
            None => self.cache.invalidate_in_background([id.to_hex()]),
        }
        Ok(updated)
    }

    /// Remove a union and stop routing its key. Returns `false` if it did
    /// not exist.
    pub async fn delete(&self, id: ObjectId) -> Result<bool> {
        let removed = self
            .collection
            .find_one_and_delete(doc! { "_id": id })
            .await?;
        self.registry.forget(&id.to_hex());

        match removed {
            Some(union) => {
                self.cache.invalidate_in_background(Self::cache_keys(&union));
                Ok(true)
            }
            None => {
                self.cache.invalidate_in_background([id.to_hex()]);
                Ok(false)
            }
        }
    }
}
