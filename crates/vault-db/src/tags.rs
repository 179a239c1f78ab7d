//! Tag repository implementation.
//!
//! Tags are global and reference counted. Counts are only ever adjusted with
//! atomic SQL expressions so concurrent record mutations cannot lose updates.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, trace};
use uuid::Uuid;

use vault_core::defaults::TAG_NAME_MAX_LEN;
use vault_core::{
    new_v7, normalize_tag_name, Bookmark, Error, Note, Result, Tag, TagFilter, TagRepository,
    TaggedRecords,
};

use crate::records;

const TAG_COLUMNS: &str = "id, name, count";

fn tag_from_row(row: &PgRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        count: row.get("count"),
    }
}

/// Normalize a single tag name, rejecting names the store cannot hold.
fn canonical_name(raw: &str) -> Result<String> {
    let name = normalize_tag_name(raw);
    if name.is_empty() {
        return Err(Error::InvalidArgument("tag name must not be empty".into()));
    }
    if name.chars().count() > TAG_NAME_MAX_LEN {
        return Err(Error::InvalidArgument(format!(
            "tag name must be {} characters or less",
            TAG_NAME_MAX_LEN
        )));
    }
    Ok(name)
}

/// Sorted, deduplicated ids so concurrent batches lock rows in the same order.
fn lock_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Canonical, deduplicated lookup names; blanks are dropped rather than rejected.
fn lookup_names(raw: &[String]) -> Vec<String> {
    let mut names: Vec<String> = raw
        .iter()
        .map(|n| normalize_tag_name(n))
        .filter(|n| !n.is_empty())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// PostgreSQL implementation of TagRepository.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    /// Create a new PgTagRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Resolve or create a tag within a transaction.
    ///
    /// The insert is a no-op when the name already exists, so two
    /// transactions racing on a new name converge on one row.
    pub async fn find_or_create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> Result<Tag> {
        let name = canonical_name(name)?;

        sqlx::query(
            "INSERT INTO tag (id, name, count) VALUES ($1, $2, 0) ON CONFLICT (name) DO NOTHING",
        )
        .bind(new_v7())
        .bind(&name)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tag WHERE name = $1"))
            .bind(&name)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let tag = tag_from_row(&row);
        trace!(
            subsystem = "db",
            component = "tags",
            tag = %tag.name,
            count = tag.count,
            "Resolved tag"
        );
        Ok(tag)
    }

    /// Resolve a set of names, creating missing tags in name order.
    ///
    /// A new tag holds its unique-index entry until commit, so every
    /// transaction must claim names in the same order.
    pub async fn resolve_many_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        names: &[String],
    ) -> Result<Vec<Tag>> {
        let mut ordered: Vec<&String> = names.iter().collect();
        ordered.sort_unstable();
        ordered.dedup();

        let mut resolved = Vec::with_capacity(ordered.len());
        for name in ordered {
            resolved.push(self.find_or_create_tx(tx, name).await?);
        }
        Ok(resolved)
    }

    /// Row-lock tags in id order for the rest of the transaction.
    ///
    /// Every count adjustment goes through here first. `NO KEY UPDATE`
    /// leaves foreign-key checks from association inserts unblocked.
    pub async fn lock_tx(&self, tx: &mut Transaction<'_, Postgres>, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = lock_order(ids);
        sqlx::query("SELECT id FROM tag WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE")
            .bind(&ids)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Remember that `owner_id` has used these tags.
    ///
    /// Call with the tags already locked; the pairs are written in id order.
    pub async fn record_usage_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO owner_tag (owner_id, tag_id) \
             SELECT $1, tag_id FROM UNNEST($2::uuid[]) AS u(tag_id) ORDER BY tag_id \
             ON CONFLICT DO NOTHING",
        )
        .bind(owner_id)
        .bind(lock_order(ids))
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Add one to every listed tag within a transaction.
    pub async fn increment_many_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
    ) -> Result<()> {
        self.adjust_tx(tx, ids, "count + 1", "increment").await
    }

    /// Subtract one from every listed tag within a transaction, clamping at zero.
    pub async fn decrement_many_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
    ) -> Result<()> {
        self.adjust_tx(tx, ids, "GREATEST(count - 1, 0)", "decrement")
            .await
    }

    async fn adjust_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
        expr: &str,
        op: &'static str,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.lock_tx(tx, ids).await?;

        let ids = lock_order(ids);
        let result = sqlx::query(&format!(
            "UPDATE tag SET count = {expr} WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "tags",
            op,
            tag_count = ids.len(),
            rows = result.rows_affected(),
            "Adjusted tag counts"
        );
        Ok(())
    }

    /// Records of both kinds carrying any of the canonical `names`.
    async fn tagged_with(&self, names: &[String]) -> Result<TaggedRecords> {
        let bookmarks =
            records::fetch_records::<Bookmark>(&self.pool, None, Some(names), None, None).await?;
        let notes =
            records::fetch_records::<Note>(&self.pool, None, Some(names), None, None).await?;
        Ok(TaggedRecords { bookmarks, notes })
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn find_or_create(&self, name: &str) -> Result<Tag> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let tag = self.find_or_create_tx(&mut tx, name).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(tag)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tag WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(tag_from_row))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = normalize_tag_name(name);
        if name.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tag WHERE name = $1"))
            .bind(&name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(tag_from_row))
    }

    async fn increment_many(&self, ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.increment_many_tx(&mut tx, ids).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn decrement_many(&self, ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.decrement_many_tx(&mut tx, ids).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn popular(&self, filter: TagFilter, limit: i64) -> Result<Vec<Tag>> {
        let owner_id = match filter.owner_id {
            Some(id) if !id.is_nil() => id,
            _ => {
                return Err(Error::InvalidArgument(
                    "popular tags require an owner".into(),
                ))
            }
        };
        if limit <= 0 {
            return Err(Error::InvalidArgument(format!(
                "limit must be positive, got {limit}"
            )));
        }

        // Only tags the owner has used are ranked; current usage is counted
        // through record ownership and the stored count stays global.
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.count
            FROM owner_tag ot
            JOIN tag t ON t.id = ot.tag_id
            LEFT JOIN (
                SELECT bt.tag_id
                FROM bookmark_tag bt
                JOIN bookmark b ON b.id = bt.bookmark_id
                WHERE b.owner_id = $1
                UNION ALL
                SELECT nt.tag_id
                FROM note_tag nt
                JOIN note n ON n.id = nt.note_id
                WHERE n.owner_id = $1
            ) owned ON owned.tag_id = t.id
            WHERE ot.owner_id = $1
            GROUP BY t.id, t.name, t.count
            ORDER BY COUNT(owned.tag_id) DESC, t.name ASC
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "tags",
            op = "popular",
            owner_id = %owner_id,
            result_count = rows.len(),
            "Ranked popular tags"
        );
        Ok(rows.iter().map(tag_from_row).collect())
    }

    async fn find_by_tag(&self, name: &str) -> Result<TaggedRecords> {
        let tag = self
            .get_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag '{}'", normalize_tag_name(name))))?;

        self.tagged_with(&[tag.name]).await
    }

    async fn find_by_tags(&self, names: &[String]) -> Result<TaggedRecords> {
        let names = lookup_names(names);
        if names.is_empty() {
            return Ok(TaggedRecords::default());
        }
        let found = self.tagged_with(&names).await?;

        debug!(
            subsystem = "db",
            component = "tags",
            op = "find_by_tags",
            tag_count = names.len(),
            result_count = found.bookmarks.len() + found.notes.len(),
            "Looked up records by tag set"
        );
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tag ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.iter().map(tag_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_normalizes() {
        assert_eq!(canonical_name("  Machine   Learning ").unwrap(), "machine-learning");
    }

    #[test]
    fn test_canonical_name_rejects_blank() {
        assert!(matches!(
            canonical_name("   ").unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_canonical_name_rejects_overlong() {
        let long = "a".repeat(TAG_NAME_MAX_LEN + 1);
        assert!(canonical_name(&long).is_err());
        assert!(canonical_name(&"a".repeat(TAG_NAME_MAX_LEN)).is_ok());
    }

    #[test]
    fn test_lookup_names_normalizes_and_drops_blanks() {
        let names = lookup_names(&["Rust".into(), " ".into(), "rust ".into(), "Go Lang".into()]);
        assert_eq!(names, vec!["go-lang".to_string(), "rust".to_string()]);
    }

    #[test]
    fn test_lock_order_sorts_and_dedups() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ordered = lock_order(&[b, a, b]);
        assert_eq!(ordered.len(), 2);
        assert!(ordered[0] <= ordered[1]);
    }
}
