//! Collection naming inside a tenant database.
//!
//! Unbounded child collections (comment threads under a news post) are split
//! one collection per parent: `{prefix}_{parent hex}`. Per-parent queries never
//! scan unrelated documents, at the cost of one collection per parent.

use mongodb::bson::oid::ObjectId;

/// News feed posts.
pub const NEWS: &str = "news";
/// Prefix of the per-post comment collections.
pub const NEWS_COMMENTS: &str = "newscomments";
pub const USERS: &str = "users";
/// Blog posts, stored in the shared blog service database.
pub const BLOG_POSTS: &str = "blog-post";

/// Derives collection names. Pure; nothing is cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionNamespacer;

impl CollectionNamespacer {
    pub fn new() -> Self {
        Self
    }

    /// Name of an unpartitioned collection.
    pub fn collection_for(&self, logical: &str) -> String {
        logical.to_string()
    }

    /// Name of the partition of `logical` owned by `parent`.
    /// - `partitioned_collection_for("newscomments", id)` -> `newscomments_65a1...`
    pub fn partitioned_collection_for(&self, logical: &str, parent: &ObjectId) -> String {
        format!("{}_{}", logical, parent.to_hex())
    }

    /// Extract the parent identifier from a partition name.
    pub fn parent_of(&self, logical: &str, collection: &str) -> Option<ObjectId> {
        let suffix = collection.strip_prefix(logical)?.strip_prefix('_')?;
        ObjectId::parse_str(suffix).ok()
    }

    /// Check if a collection is a partition of `logical`.
    pub fn is_partition_of(&self, logical: &str, collection: &str) -> bool {
        self.parent_of(logical, collection).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_for() {
        let ns = CollectionNamespacer::new();
        assert_eq!(ns.collection_for(NEWS), "news");
        assert_eq!(ns.collection_for(BLOG_POSTS), "blog-post");
    }

    #[test]
    fn test_partition_is_deterministic() {
        let ns = CollectionNamespacer::new();
        let parent = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();

        let first = ns.partitioned_collection_for(NEWS_COMMENTS, &parent);
        let second = ns.partitioned_collection_for(NEWS_COMMENTS, &parent);

        assert_eq!(first, "newscomments_65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(first, second);
    }

    #[test]
    fn test_partitions_are_distinct_per_parent() {
        let ns = CollectionNamespacer::new();
        let names: std::collections::HashSet<String> = (0..100)
            .map(|_| ns.partitioned_collection_for(NEWS_COMMENTS, &ObjectId::new()))
            .collect();
        assert_eq!(names.len(), 100);
    }

    #[test]
    fn test_parent_of() {
        let ns = CollectionNamespacer::new();
        let parent = ObjectId::new();
        let name = ns.partitioned_collection_for(NEWS_COMMENTS, &parent);

        assert_eq!(ns.parent_of(NEWS_COMMENTS, &name), Some(parent));
        assert!(ns.is_partition_of(NEWS_COMMENTS, &name));

        assert_eq!(ns.parent_of(NEWS_COMMENTS, "newscomments"), None);
        assert_eq!(ns.parent_of(NEWS_COMMENTS, "newscomments_xyz"), None);
        assert_eq!(ns.parent_of(NEWS, &name), None);
    }
}
