//! Union (tenant) document stored in the bootstrap database.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Union {
    /// MongoDB document ID, also the tenant key in hex form
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub name: String,

    /// URL slug of the name; doubles as the physical database name
    #[serde(rename = "unionID")]
    pub union_id: String,

    #[serde(default)]
    pub status: i32,

    #[serde(rename = "createdOn", default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deleted: bool,
}

impl Union {
    /// Create a new union. The slug is derived from the name.
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.trim().to_string(),
            union_id: slugify(name),
            status: 0,
            created_on: Some(Utc::now()),
            deleted: false,
        }
    }
}

/// Lowercase, whitespace runs collapsed to a single `-`.
/// - `"  Acme   Workers "` -> `"acme-workers"`
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
