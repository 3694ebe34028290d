//! News feed repository.
//!
//! Posts live in the tenant's `news` collection; the comments of each post
//! live in their own `newscomments_<newsId>` partition.

use std::sync::Arc;

use futures::{FutureExt, TryStreamExt};
use mongodb::Collection;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Document, doc};
use mongodb::options::ReturnDocument;
use tracing::debug;

use crate::database::models::{Comment, News};
use crate::database::mongo::MongoProvider;
use crate::database::namespace::{NEWS, NEWS_COMMENTS};
use crate::database::registry::{DatabaseHandle, DatabaseRegistry};
use crate::error::{Error, Result};

/// Pinned posts first, then newest.
fn feed_order() -> Document {
    doc! { "pinned": -1, "createdOn": -1 }
}

pub struct NewsRepository {
    registry: Arc<DatabaseRegistry<MongoProvider>>,
}

impl NewsRepository {
    pub fn new(registry: Arc<DatabaseRegistry<MongoProvider>>) -> Self {
        Self { registry }
    }

    async fn news(&self, tenant: &str) -> Result<Collection<News>> {
        self.registry.get_collection::<News>(tenant, NEWS).await
    }

    async fn comments_of(&self, tenant: &str, news_id: &ObjectId) -> Result<Collection<Comment>> {
        self.registry
            .get_partitioned_collection::<Comment>(tenant, NEWS_COMMENTS, news_id)
            .await
    }

    /// One page of the tenant's feed with authors joined in, plus the total
    /// number of posts matching `filter`.
    pub async fn list(
        &self,
        tenant: &str,
        filter: Document,
        page: u64,
        limit: i64,
    ) -> Result<(Vec<News>, u64)> {
        let news = self.news(tenant).await?;
        let total = news.count_documents(filter.clone()).await?;

        let pipeline = super::page_with_creator(filter, feed_order(), page, limit);
        let posts = news
            .aggregate(pipeline)
            .allow_disk_use(true)
            .with_type::<News>()
            .await?
            .try_collect()
            .await?;

        Ok((posts, total))
    }

    pub async fn find(&self, tenant: &str, id: ObjectId) -> Result<Option<News>> {
        let news = self.news(tenant).await?;
        Ok(news.find_one(doc! { "_id": id }).await?)
    }

    pub async fn create(&self, tenant: &str, mut post: News) -> Result<News> {
        let news = self.news(tenant).await?;
        let result = news.insert_one(&post).await?;
        post.id = result.inserted_id.as_object_id();
        debug!("Created news {:?} for {}", post.id, tenant);
        Ok(post)
    }

    /// Apply `update` (an update document, e.g. `{"$set": ...}`) and return
    /// the post as it is afterwards.
    pub async fn update(&self, tenant: &str, id: ObjectId, update: Document) -> Result<Option<News>> {
        let news = self.news(tenant).await?;
        Ok(news
            .find_one_and_update(doc! { "_id": id }, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    /// Store `comment` in its post's partition and bump the post's comment
    /// count, atomically.
    pub async fn add_comment(&self, tenant: &str, mut comment: Comment) -> Result<Comment> {
        let db = self.registry.get_database(tenant).await?;
        let news: Collection<News> = db.collection(&self.registry.namespacer().collection_for(NEWS));
        let comments: Collection<Comment> = db.collection(
            &self
                .registry
                .namespacer()
                .partitioned_collection_for(NEWS_COMMENTS, &comment.news_id),
        );

        let id = *comment.id.get_or_insert_with(ObjectId::new);
        let news_id = comment.news_id;
        let stored = comment.clone();

        db.with_transaction(move |session| {
            async move {
                comments.insert_one(&stored).session(&mut *session).await?;
                news.update_one(
                    doc! { "_id": news_id },
                    doc! { "$inc": { "commentCount": 1 } },
                )
                .session(&mut *session)
                .await?;
                Ok::<(), Error>(())
            }
            .boxed()
        })
        .await?;

        debug!("Added comment {} to news {} for {}", id, news_id, tenant);
        Ok(comment)
    }

    /// One page of live comments on a post, newest first, authors joined in.
    pub async fn comments(
        &self,
        tenant: &str,
        news_id: ObjectId,
        page: u64,
        limit: i64,
    ) -> Result<Vec<Comment>> {
        let comments = self.comments_of(tenant, &news_id).await?;
        let pipeline = super::page_with_creator(
            doc! { "deleted": false },
            doc! { "createdOn": -1 },
            page,
            limit,
        );

        Ok(comments
            .aggregate(pipeline)
            .allow_disk_use(true)
            .with_type::<Comment>()
            .await?
            .try_collect()
            .await?)
    }

    pub async fn find_comment(
        &self,
        tenant: &str,
        news_id: ObjectId,
        comment_id: ObjectId,
    ) -> Result<Option<Comment>> {
        let comments = self.comments_of(tenant, &news_id).await?;
        Ok(comments.find_one(doc! { "_id": comment_id }).await?)
    }

    /// Soft-delete a comment. Returns `false` if it did not exist.
    pub async fn delete_comment(
        &self,
        tenant: &str,
        news_id: ObjectId,
        comment_id: ObjectId,
    ) -> Result<bool> {
        let comments = self.comments_of(tenant, &news_id).await?;
        let result = comments
            .update_one(
                doc! { "_id": comment_id, "deleted": false },
                doc! { "$set": { "deleted": true } },
            )
            .await?;

        if result.modified_count == 0 {
            return Ok(false);
        }

        let news = self.news(tenant).await?;
        news.update_one(
            doc! { "_id": news_id },
            doc! { "$inc": { "commentCount": -1 } },
        )
        .await?;
        Ok(true)
    }
}
