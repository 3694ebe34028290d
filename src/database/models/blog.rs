//! Blog posts, shared by every tenant.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    #[serde(default)]
    pub header: String,

    #[serde(default)]
    pub content: String,

    #[serde(rename = "createdOn")]
    pub created_on: DateTime<Utc>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub featured: bool,
}
