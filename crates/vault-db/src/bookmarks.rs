//! Bookmark table layout.

use sqlx::postgres::PgRow;
use sqlx::Row;

use vault_core::{Bookmark, BookmarkFields};

use crate::records::{PgQuery, PgRecordRepository, RecordTable};
use crate::tagging::{AssocTable, BOOKMARK_TAGS};

/// Bookmarks keyed by `(owner_id, url)`.
pub type PgBookmarkRepository = PgRecordRepository<Bookmark>;

impl RecordTable for Bookmark {
    const TABLE: &'static str = "bookmark";
    const TAGS: AssocTable = BOOKMARK_TAGS;
    const FIELD_COLUMNS: &'static [&'static str] = &["url", "title", "description"];
    const NATURAL_KEY_COLUMN: &'static str = "url";
    const UNIQUE_CONSTRAINT: &'static str = "bookmark_owner_url_key";

    fn fields_from_row(row: &PgRow) -> BookmarkFields {
        BookmarkFields {
            url: row.get("url"),
            title: row.get("title"),
            description: row.get("description"),
        }
    }

    fn bind_fields<'q>(query: PgQuery<'q>, fields: &'q BookmarkFields) -> PgQuery<'q> {
        query
            .bind(fields.url.as_str())
            .bind(fields.title.as_str())
            .bind(fields.description.as_str())
    }
}
