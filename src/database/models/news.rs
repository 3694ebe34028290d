//! News feed posts and their comments.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Author details joined in from the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(rename = "firstName", default)]
    pub first_name: String,

    #[serde(rename = "lastName", default)]
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct News {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub content: String,

    #[serde(rename = "userID")]
    pub user_id: ObjectId,

    #[serde(rename = "createdOn")]
    pub created_on: DateTime<Utc>,

    #[serde(default)]
    pub likes: Vec<ObjectId>,

    #[serde(default)]
    pub pinned: bool,

    #[serde(rename = "commentCount", default)]
    pub comment_count: i64,

    #[serde(default)]
    pub deleted: bool,

    /// Present only on aggregated reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,
}

impl News {
    pub fn new(user_id: ObjectId, content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            user_id,
            created_on: Utc::now(),
            likes: Vec::new(),
            pinned: false,
            comment_count: 0,
            deleted: false,
            creator: None,
        }
    }
}

/// A comment, stored in the partition collection of its news post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "newsID")]
    pub news_id: ObjectId,

    #[serde(default)]
    pub content: String,

    #[serde(rename = "userID")]
    pub user_id: ObjectId,

    #[serde(rename = "createdOn")]
    pub created_on: DateTime<Utc>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,
}

impl Comment {
    pub fn new(news_id: ObjectId, user_id: ObjectId, content: impl Into<String>) -> Self {
        Self {
            id: None,
            news_id,
            content: content.into(),
            user_id,
            created_on: Utc::now(),
            deleted: false,
            creator: None,
        }
    }
}
