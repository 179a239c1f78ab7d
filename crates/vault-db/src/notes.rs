//! Note table layout.

use sqlx::postgres::PgRow;
use sqlx::Row;

use vault_core::{Note, NoteFields};

use crate::records::{PgQuery, PgRecordRepository, RecordTable};
use crate::tagging::{AssocTable, NOTE_TAGS};

/// Notes keyed by `(owner_id, title)`.
pub type PgNoteRepository = PgRecordRepository<Note>;

impl RecordTable for Note {
    const TABLE: &'static str = "note";
    const TAGS: AssocTable = NOTE_TAGS;
    const FIELD_COLUMNS: &'static [&'static str] = &["title", "content"];
    const NATURAL_KEY_COLUMN: &'static str = "title";
    const UNIQUE_CONSTRAINT: &'static str = "note_owner_title_key";

    fn fields_from_row(row: &PgRow) -> NoteFields {
        NoteFields {
            title: row.get("title"),
            content: row.get("content"),
        }
    }

    fn bind_fields<'q>(query: PgQuery<'q>, fields: &'q NoteFields) -> PgQuery<'q> {
        query
            .bind(fields.title.as_str())
            .bind(fields.content.as_str())
    }
}
