//! Core traits for vault abstractions.
//!
//! These traits define the interfaces that concrete stores must satisfy,
//! enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

// =============================================================================
// TAGGABLE RECORDS
// =============================================================================

/// Content fields of a record kind.
pub trait RecordFields: Clone + Send + Sync + 'static {
    /// The owner-scoped uniqueness key.
    fn natural_key(&self) -> &str;

    /// Reject field values the store cannot hold.
    fn validate(&self) -> Result<()> {
        if self.natural_key().trim().is_empty() {
            return Err(Error::InvalidArgument(
                "natural key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Capability shared by bookmarks and notes so the tag lifecycle is
/// written once.
pub trait TaggableRecord: Clone + Send + Sync + 'static {
    type Fields: RecordFields;

    const KIND: RecordKind;

    fn id(&self) -> Uuid;
    fn owner_id(&self) -> Uuid;
    fn natural_key(&self) -> &str;
    fn tags(&self) -> &[TagRef];
    fn created_at(&self) -> DateTime<Utc>;

    /// Assemble a record from its stored parts.
    fn from_parts(
        id: Uuid,
        owner_id: Uuid,
        fields: Self::Fields,
        tags: Vec<TagRef>,
        created_at: DateTime<Utc>,
    ) -> Self;

    /// Denormalized copy for the search index.
    fn to_projection(&self) -> SearchProjection;

    /// Rebuild a record from indexed field values.
    fn from_projection(projection: SearchProjection) -> Result<Self>;

    /// Canonical names of the currently associated tags.
    fn tag_names(&self) -> Vec<String> {
        self.tags().iter().map(|t| t.name.clone()).collect()
    }

    /// Ids of the currently associated tags.
    fn tag_ids(&self) -> Vec<Uuid> {
        self.tags().iter().map(|t| t.id).collect()
    }
}

impl RecordFields for BookmarkFields {
    fn natural_key(&self) -> &str {
        &self.url
    }
}

impl RecordFields for NoteFields {
    fn natural_key(&self) -> &str {
        &self.title
    }
}

impl TaggableRecord for Bookmark {
    type Fields = BookmarkFields;

    const KIND: RecordKind = RecordKind::Bookmark;

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    fn natural_key(&self) -> &str {
        &self.url
    }

    fn tags(&self) -> &[TagRef] {
        &self.tags
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn from_parts(
        id: Uuid,
        owner_id: Uuid,
        fields: BookmarkFields,
        tags: Vec<TagRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            url: fields.url,
            title: fields.title,
            description: fields.description,
            tags,
            created_at,
        }
    }

    fn to_projection(&self) -> SearchProjection {
        SearchProjection {
            id: self.id,
            kind: Self::KIND,
            owner_id: self.owner_id,
            title: self.title.clone(),
            body: self.description.clone(),
            url: Some(self.url.clone()),
            tag_names: self.tag_names(),
            tag_ids: self.tag_ids(),
            created_at: self.created_at,
        }
    }

    fn from_projection(projection: SearchProjection) -> Result<Self> {
        if projection.kind != Self::KIND {
            return Err(Error::Search(format!(
                "expected bookmark projection, got {}",
                projection.kind
            )));
        }
        let tags = projection.tag_refs();
        let url = projection.url.ok_or_else(|| {
            Error::Search(format!("bookmark projection {} has no url", projection.id))
        })?;
        Ok(Self {
            id: projection.id,
            owner_id: projection.owner_id,
            url,
            title: projection.title,
            description: projection.body,
            tags,
            created_at: projection.created_at,
        })
    }
}

impl TaggableRecord for Note {
    type Fields = NoteFields;

    const KIND: RecordKind = RecordKind::Note;

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    fn natural_key(&self) -> &str {
        &self.title
    }

    fn tags(&self) -> &[TagRef] {
        &self.tags
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn from_parts(
        id: Uuid,
        owner_id: Uuid,
        fields: NoteFields,
        tags: Vec<TagRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            title: fields.title,
            content: fields.content,
            tags,
            created_at,
        }
    }

    fn to_projection(&self) -> SearchProjection {
        SearchProjection {
            id: self.id,
            kind: Self::KIND,
            owner_id: self.owner_id,
            title: self.title.clone(),
            body: self.content.clone(),
            url: None,
            tag_names: self.tag_names(),
            tag_ids: self.tag_ids(),
            created_at: self.created_at,
        }
    }

    fn from_projection(projection: SearchProjection) -> Result<Self> {
        if projection.kind != Self::KIND {
            return Err(Error::Search(format!(
                "expected note projection, got {}",
                projection.kind
            )));
        }
        let tags = projection.tag_refs();
        Ok(Self {
            id: projection.id,
            owner_id: projection.owner_id,
            title: projection.title,
            content: projection.body,
            tags,
            created_at: projection.created_at,
        })
    }
}

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for taggable records of one kind.
///
/// Every mutating operation is a single relational transaction covering the
/// record row, its associations and the affected tag counts.
#[async_trait]
pub trait RecordRepository<R: TaggableRecord>: Send + Sync {
    /// Create a record and associate its tags. `AlreadyExists` on a
    /// natural-key collision.
    async fn create(&self, req: CreateRecord<R::Fields>) -> Result<R>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<R>;

    /// Fetch a record by its owner-scoped natural key.
    async fn get_by_natural_key(&self, owner_id: Uuid, key: &str) -> Result<R>;

    /// Replace fields and, when requested, reconcile tags.
    async fn update(&self, id: Uuid, req: UpdateRecord<R::Fields>) -> Result<R>;

    /// Delete a record, releasing every tag it holds.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// List records, newest first.
    async fn list(&self, filter: RecordFilter) -> Result<Vec<R>>;
}

/// Repository for shared, reference-counted tags.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Resolve a tag by canonical name, creating it with count 0 if needed.
    async fn find_or_create(&self, name: &str) -> Result<Tag>;

    /// Fetch a tag by id.
    async fn get(&self, id: Uuid) -> Result<Option<Tag>>;

    /// Look up a tag by (raw or canonical) name.
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Atomically add one to each tag's count.
    async fn increment_many(&self, ids: &[Uuid]) -> Result<()>;

    /// Atomically subtract one from each tag's count, clamping at zero.
    async fn decrement_many(&self, ids: &[Uuid]) -> Result<()>;

    /// Rank the tags an owner has used by current usage.
    /// `InvalidArgument` without an owner.
    async fn popular(&self, filter: TagFilter, limit: i64) -> Result<Vec<Tag>>;

    /// Every record carrying the named tag.
    async fn find_by_tag(&self, name: &str) -> Result<TaggedRecords>;

    /// Every record carrying any of the named tags, each record once.
    /// Unknown names match nothing.
    async fn find_by_tags(&self, names: &[String]) -> Result<TaggedRecords>;

    /// All tags ordered by name.
    async fn list(&self) -> Result<Vec<Tag>>;
}

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Search index adapter fed with record projections.
///
/// The index is a derived view: writes happen after the relational commit and
/// are never part of it.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the projection stored under `id`.
    async fn index(&self, id: Uuid, projection: &SearchProjection) -> Result<()>;

    /// Remove the projection stored under `id`. Missing ids are not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Owner-scoped text query, newest first.
    async fn query(&self, query: &SearchQuery) -> Result<Vec<SearchProjection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_note() -> Note {
        Note {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "A".into(),
            content: "hello".into(),
            tags: vec![TagRef {
                id: Uuid::new_v4(),
                name: "go".into(),
            }],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_note_projection_round_trip_keeps_tags() {
        let note = sample_note();
        let projection = note.to_projection();
        assert_eq!(projection.kind, RecordKind::Note);
        assert_eq!(projection.body, "hello");
        assert_eq!(projection.tag_names, vec!["go"]);

        let rebuilt = Note::from_projection(projection).unwrap();
        assert_eq!(rebuilt, note);
    }

    #[test]
    fn test_bookmark_projection_carries_url() {
        let bookmark = Bookmark::from_parts(
            Uuid::new_v4(),
            Uuid::new_v4(),
            BookmarkFields {
                url: "https://example.com".into(),
                title: "Example".into(),
                description: "site".into(),
            },
            vec![],
            Utc::now(),
        );
        let projection = bookmark.to_projection();
        assert_eq!(projection.url.as_deref(), Some("https://example.com"));
        assert_eq!(projection.body, "site");
        assert_eq!(Bookmark::from_projection(projection).unwrap(), bookmark);
    }

    #[test]
    fn test_from_projection_rejects_wrong_kind() {
        let projection = sample_note().to_projection();
        let err = Bookmark::from_projection(projection).unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }

    #[test]
    fn test_bookmark_projection_without_url_is_rejected() {
        let mut projection = Bookmark::from_parts(
            Uuid::new_v4(),
            Uuid::new_v4(),
            BookmarkFields {
                url: "https://example.com".into(),
                ..Default::default()
            },
            vec![],
            Utc::now(),
        )
        .to_projection();
        projection.url = None;
        assert!(Bookmark::from_projection(projection).is_err());
    }

    #[test]
    fn test_fields_validate_natural_key() {
        let fields = NoteFields {
            title: "   ".into(),
            content: "body".into(),
        };
        assert!(matches!(
            fields.validate().unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(BookmarkFields {
            url: "https://example.com".into(),
            ..Default::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_natural_key_per_kind() {
        let note = sample_note();
        assert_eq!(TaggableRecord::natural_key(&note), "A");
        assert_eq!(note.tag_ids().len(), 1);
    }
}
