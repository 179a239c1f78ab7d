//! Core data models for vault.
//!
//! These types are shared across all vault crates and represent the
//! domain entities: taggable records, tags, and their search projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// RECORD KIND
// =============================================================================

/// The two kinds of taggable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Bookmark,
    Note,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bookmark => "bookmark",
            Self::Note => "note",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookmark" => Ok(Self::Bookmark),
            "note" => Ok(Self::Note),
            _ => Err(format!("Invalid record kind: {}", s)),
        }
    }
}

// =============================================================================
// TAG TYPES
// =============================================================================

/// A globally shared tag with its system-wide reference count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    /// Canonical name (see `tags::normalize_tag_name`).
    pub name: String,
    /// Number of live record associations. Never negative.
    pub count: i64,
}

/// Tag reference as carried by a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagRef {
    pub id: Uuid,
    pub name: String,
}

impl From<&Tag> for TagRef {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
        }
    }
}

/// Filter for tag popularity ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagFilter {
    /// Required: ranking is always scoped to one owner.
    pub owner_id: Option<Uuid>,
}

impl TagFilter {
    pub fn for_owner(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
        }
    }
}

/// Every record associated with one tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaggedRecords {
    pub bookmarks: Vec<Bookmark>,
    pub notes: Vec<Note>,
}

// =============================================================================
// BOOKMARK TYPES
// =============================================================================

/// Mutable content of a bookmark. `url` is the owner-scoped natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkFields {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A saved link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Uuid,
    #[serde(skip_serializing, default)]
    pub owner_id: Uuid,
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<TagRef>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Mutable content of a note. `title` is the owner-scoped natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// A free-form text note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    #[serde(skip_serializing, default)]
    pub owner_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<TagRef>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// RECORD REQUESTS
// =============================================================================

/// Request for creating a taggable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecord<F> {
    pub owner_id: Uuid,
    pub fields: F,
    /// Raw tag names; normalized and deduplicated before use.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request for updating a taggable record.
///
/// Fields are replaced wholesale. `tags: None` leaves associations untouched;
/// `Some(vec![])` removes every tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord<F> {
    pub fields: F,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Filter for listing records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    pub owner_id: Option<Uuid>,
    /// Single tag name; normalized before matching.
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RecordFilter {
    pub fn for_owner(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// Denormalized, index-only copy of a record's searchable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProjection {
    pub id: Uuid,
    pub kind: RecordKind,
    pub owner_id: Uuid,
    pub title: String,
    /// Description for bookmarks, content for notes.
    pub body: String,
    /// Bookmarks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub tag_names: Vec<String>,
    pub tag_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SearchProjection {
    /// Tag references rebuilt from the parallel name/id lists.
    pub fn tag_refs(&self) -> Vec<TagRef> {
        self.tag_ids
            .iter()
            .zip(&self.tag_names)
            .map(|(id, name)| TagRef {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }
}

/// A query against the search index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub owner_id: Uuid,
    pub kind: RecordKind,
    /// Free text; empty matches every record of the owner.
    pub text: String,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_round_trips_through_str() {
        for kind in [RecordKind::Bookmark, RecordKind::Note] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("folder".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_record_kind_serde_snake_case() {
        let json = serde_json::to_string(&RecordKind::Bookmark).unwrap();
        assert_eq!(json, "\"bookmark\"");
    }

    #[test]
    fn test_owner_id_not_serialized() {
        let note = Note {
            id: Uuid::nil(),
            owner_id: Uuid::new_v4(),
            title: "t".into(),
            content: "c".into(),
            tags: vec![],
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&note).unwrap();
        assert!(value.get("owner_id").is_none());
        assert_eq!(value["title"], "t");
    }

    #[test]
    fn test_projection_created_at_is_iso8601() {
        let created_at = DateTime::parse_from_rfc3339("2026-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let projection = SearchProjection {
            id: Uuid::nil(),
            kind: RecordKind::Note,
            owner_id: Uuid::nil(),
            title: "a".into(),
            body: "b".into(),
            url: None,
            tag_names: vec![],
            tag_ids: vec![],
            created_at,
        };
        let value = serde_json::to_value(&projection).unwrap();
        assert_eq!(value["created_at"], "2026-03-01T12:30:00Z");
        assert!(value.get("url").is_none());
    }

    #[test]
    fn test_projection_tag_refs_pairs_ids_with_names() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let projection = SearchProjection {
            id: Uuid::nil(),
            kind: RecordKind::Bookmark,
            owner_id: Uuid::nil(),
            title: String::new(),
            body: String::new(),
            url: Some("https://example.com".into()),
            tag_names: vec!["go".into(), "rust".into()],
            tag_ids: vec![a, b],
            created_at: Utc::now(),
        };
        let refs = projection.tag_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], TagRef { id: a, name: "go".into() });
        assert_eq!(refs[1], TagRef { id: b, name: "rust".into() });
    }

    #[test]
    fn test_record_filter_builder() {
        let owner = Uuid::new_v4();
        let filter = RecordFilter::for_owner(owner)
            .with_tag("go")
            .with_limit(5)
            .with_offset(10);
        assert_eq!(filter.owner_id, Some(owner));
        assert_eq!(filter.offset, Some(10));
        assert_eq!(filter.tag.as_deref(), Some("go"));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn test_update_record_tags_default_to_none() {
        let req: UpdateRecord<NoteFields> =
            serde_json::from_str(r#"{"fields":{"title":"a"}}"#).unwrap();
        assert!(req.tags.is_none());
        assert_eq!(req.fields.content, "");
    }
}
