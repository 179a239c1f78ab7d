//! # vault-search
//!
//! Embedded tantivy index holding denormalized projections of committed
//! bookmarks and notes. Queries are owner-scoped, filtered by record kind,
//! scored over title and body, and returned newest first.

pub mod index;
pub mod schema;

pub use index::TantivySearchIndex;
