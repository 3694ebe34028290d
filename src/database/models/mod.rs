//! Document models.

pub mod blog;
pub mod news;
pub mod union;

pub use blog::Blog;
pub use news::{Comment, Creator, News};
pub use union::Union;
