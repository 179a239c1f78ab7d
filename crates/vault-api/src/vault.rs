//! Service container.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use vault_core::defaults::POPULAR_TAGS_LIMIT;
use vault_core::{Bookmark, Note, Result, SearchIndex, Tag, TagFilter, TagRepository, TaggedRecords};
use vault_db::Database;
use vault_search::TantivySearchIndex;

use crate::config::VaultConfig;
use crate::services::{RebuildReport, RecordService, RequestLimiter};

/// Bookmarks, notes and tags over one pool and one search index.
#[derive(Clone)]
pub struct Vault {
    pub bookmarks: RecordService<Bookmark>,
    pub notes: RecordService<Note>,
    pub tags: Arc<dyn TagRepository>,
    pub limiter: Arc<RequestLimiter>,
}

impl Vault {
    /// Connect to Postgres, apply migrations and open the search index.
    pub async fn connect(config: &VaultConfig) -> Result<Self> {
        let db = Database::connect_with_config(&config.database_url, &config.pool).await?;
        db.migrate().await?;
        db.pool_stats().log();

        let index = match &config.search_index_path {
            Some(path) => TantivySearchIndex::open(path, config.search_writer_heap_bytes)?,
            None => TantivySearchIndex::in_memory()?,
        };
        let index: Arc<dyn SearchIndex> = Arc::new(index);
        let limiter = Arc::new(RequestLimiter::new(&config.rate_limit)?);

        info!(
            subsystem = "service",
            component = "vault",
            sync_mode = ?config.sync_mode,
            persistent_index = config.search_index_path.is_some(),
            "Vault services ready"
        );

        Ok(Self {
            bookmarks: RecordService::new(
                Arc::new(db.bookmarks.clone()),
                Arc::clone(&index),
                config.sync_mode,
            ),
            notes: RecordService::new(Arc::new(db.notes.clone()), index, config.sync_mode),
            tags: Arc::new(db.tags),
            limiter,
        })
    }

    /// Assemble from already-built services.
    pub fn from_parts(
        bookmarks: RecordService<Bookmark>,
        notes: RecordService<Note>,
        tags: Arc<dyn TagRepository>,
        limiter: Arc<RequestLimiter>,
    ) -> Self {
        Self {
            bookmarks,
            notes,
            tags,
            limiter,
        }
    }

    /// Most used tags for an owner; `limit` defaults to [`POPULAR_TAGS_LIMIT`].
    pub async fn popular_tags(&self, owner_id: Uuid, limit: Option<i64>) -> Result<Vec<Tag>> {
        self.tags
            .popular(TagFilter::for_owner(owner_id), limit.unwrap_or(POPULAR_TAGS_LIMIT))
            .await
    }

    pub async fn find_by_tag(&self, name: &str) -> Result<TaggedRecords> {
        self.tags.find_by_tag(name).await
    }

    pub async fn find_by_tags(&self, names: &[String]) -> Result<TaggedRecords> {
        self.tags.find_by_tags(names).await
    }

    /// Rebuild the index entries of both record kinds for one owner.
    pub async fn rebuild_index(&self, owner_id: Uuid) -> Result<RebuildReport> {
        let bookmarks = self.bookmarks.rebuild_index(owner_id).await?;
        let notes = self.notes.rebuild_index(owner_id).await?;
        Ok(RebuildReport {
            indexed: bookmarks.indexed + notes.indexed,
            purged: bookmarks.purged + notes.purged,
        })
    }
}
