//! Blog repository.
//!
//! Blog posts are not tenant data: they live in a shared service database
//! reached through the `blogs` service override.

use std::sync::Arc;

use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Document, doc};
use mongodb::options::ReturnDocument;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::database::models::Blog;
use crate::database::mongo::MongoProvider;
use crate::database::namespace::BLOG_POSTS;
use crate::database::registry::DatabaseRegistry;
use crate::error::{Error, Result};

/// Service key under which the blog database is registered.
pub const BLOG_SERVICE_KEY: &str = "blogs";
/// Default physical database behind [`BLOG_SERVICE_KEY`].
pub const BLOG_SERVICE_DB: &str = "blog";

fn blog_key(id: &ObjectId) -> String {
    format!("blog:{}", id.to_hex())
}

pub struct BlogRepository {
    registry: Arc<DatabaseRegistry<MongoProvider>>,
    cache: CacheStore,
}

impl BlogRepository {
    /// Registers the `blogs -> blog` override unless configuration already
    /// mapped the key elsewhere.
    pub fn new(registry: Arc<DatabaseRegistry<MongoProvider>>, cache: CacheStore) -> Self {
        let resolver = registry.resolver();
        if resolver.service_override(BLOG_SERVICE_KEY).is_none() {
            resolver.register_service_override(BLOG_SERVICE_KEY, BLOG_SERVICE_DB);
            info!("Registered service database {} -> {}", BLOG_SERVICE_KEY, BLOG_SERVICE_DB);
        }
        Self { registry, cache }
    }

    async fn posts(&self) -> Result<Collection<Blog>> {
        self.registry
            .get_collection::<Blog>(BLOG_SERVICE_KEY, BLOG_POSTS)
            .await
    }

    /// Posts matching `filter`, newest first.
    pub async fn find_all(&self, filter: Document) -> Result<Vec<Blog>> {
        let posts = self.posts().await?;
        Ok(posts
            .find(filter)
            .sort(doc! { "createdOn": -1 })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<Blog>> {
        let posts = self.posts().await?;
        self.cache
            .read_through(&blog_key(&id), || async move {
                Ok::<_, Error>(posts.find_one(doc! { "_id": id }).await?)
            })
            .await
    }

    pub async fn create(&self, mut blog: Blog) -> Result<Blog> {
        let posts = self.posts().await?;
        let result = posts.insert_one(&blog).await?;
        blog.id = result.inserted_id.as_object_id();

        if let Some(id) = &blog.id {
            self.cache.populate_in_background(blog_key(id), &blog);
        }
        Ok(blog)
    }

    /// Apply `$set: changes` and return the post as it is afterwards.
    pub async fn update(&self, id: ObjectId, changes: Document) -> Result<Option<Blog>> {
        let posts = self.posts().await?;
        let updated = posts
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": changes })
            .return_document(ReturnDocument::After)
            .await?;

        self.cache.invalidate_in_background([blog_key(&id)]);
        Ok(updated)
    }

    /// Insert or replace each post by id. Posts without an id get a fresh one.
    /// Returns how many posts were inserted or modified.
    pub async fn upsert_many(&self, blogs: &[Blog]) -> Result<u64> {
        let posts = self.posts().await?;
        let mut written = 0;
        let mut touched = Vec::with_capacity(blogs.len());

        for blog in blogs {
            let mut blog = blog.clone();
            let id = *blog.id.get_or_insert_with(ObjectId::new);

            let result = posts
                .replace_one(doc! { "_id": id }, &blog)
                .upsert(true)
                .await?;

            if result.upserted_id.is_some() || result.modified_count > 0 {
                written += 1;
            }
            touched.push(blog_key(&id));
        }

        debug!("Upserted {} of {} blog posts", written, blogs.len());
        self.cache.invalidate_in_background(touched);
        Ok(written)
    }

    /// Soft-delete a post and return it. `None` if it did not exist.
    pub async fn delete(&self, id: ObjectId) -> Result<Option<Blog>> {
        let posts = self.posts().await?;
        let deleted = posts
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": { "deleted": true } })
            .return_document(ReturnDocument::After)
            .await?;

        self.cache.invalidate_in_background([blog_key(&id)]);
        Ok(deleted)
    }
}
