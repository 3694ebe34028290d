//! Repository module - data access on top of the registry and cache.

mod blog_repository;
mod news_repository;
mod union_repository;

pub use blog_repository::{BLOG_SERVICE_DB, BLOG_SERVICE_KEY, BlogRepository};
pub use news_repository::NewsRepository;
pub use union_repository::{ALL_UNIONS_KEY, UnionRepository};

use mongodb::bson::{Document, doc};

/// Skip count for a 1-based page.
pub(crate) fn skip_for(page: u64, limit: i64) -> u64 {
    page.saturating_sub(1) * limit.max(0) as u64
}

/// Aggregation for one page of documents with their author joined in from
/// `users`. Documents without a matching author are kept.
pub(crate) fn page_with_creator(filter: Document, sort: Document, page: u64, limit: i64) -> Vec<Document> {
    vec![
        doc! {
            "$lookup": {
                "from": crate::database::namespace::USERS,
                "localField": "userID",
                "foreignField": "_id",
                "as": "creator",
            }
        },
        doc! {
            "$unwind": {
                "path": "$creator",
                "preserveNullAndEmptyArrays": true,
            }
        },
        doc! { "$match": filter },
        doc! { "$sort": sort },
        doc! { "$skip": skip_for(page, limit) as i64 },
        doc! { "$limit": limit },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_for() {
        assert_eq!(skip_for(1, 20), 0);
        assert_eq!(skip_for(3, 20), 40);
        assert_eq!(skip_for(0, 20), 0);
        assert_eq!(skip_for(2, -5), 0);
    }

    #[test]
    fn test_page_with_creator() {
        let pipeline = page_with_creator(
            doc! { "deleted": false },
            doc! { "createdOn": -1 },
            2,
            10,
        );

        assert_eq!(pipeline.len(), 6);
        let lookup = pipeline[0].get_document("$lookup").unwrap();
        assert_eq!(lookup.get_str("from").unwrap(), "users");
        assert_eq!(lookup.get_str("as").unwrap(), "creator");

        let unwind = pipeline[1].get_document("$unwind").unwrap();
        assert!(unwind.get_bool("preserveNullAndEmptyArrays").unwrap());

        assert_eq!(pipeline[2], doc! { "$match": { "deleted": false } });
        assert_eq!(pipeline[4], doc! { "$skip": 10_i64 });
        assert_eq!(pipeline[5], doc! { "$limit": 10_i64 });
    }
}
