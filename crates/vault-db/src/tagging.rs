//! Record-to-tag association lifecycle.
//!
//! Bookmarks and notes share one implementation of attach, reconcile and
//! release; each kind only supplies its association table. Every function here
//! runs inside the caller's transaction and adjusts tag counts exactly once
//! per association row it creates or removes.
//!
//! Lock order is fixed: new tag names in name order, then tag rows in id
//! order. Nothing claims a tag name after locking a tag row.

use std::collections::HashMap;

use sqlx::postgres::PgExecutor;
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use vault_core::{diff_tags, Error, Result, TagDiff, TagRef};

use crate::tags::PgTagRepository;

/// Association table linking one record kind to tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssocTable {
    /// Table name, e.g. `bookmark_tag`.
    pub table: &'static str,
    /// Column referencing the record, e.g. `bookmark_id`.
    pub record_fk: &'static str,
}

pub const BOOKMARK_TAGS: AssocTable = AssocTable {
    table: "bookmark_tag",
    record_fk: "bookmark_id",
};

pub const NOTE_TAGS: AssocTable = AssocTable {
    table: "note_tag",
    record_fk: "note_id",
};

/// Load the tags of many records with a single query, ordered by name.
pub async fn load_tags_for<'e, E>(
    executor: E,
    assoc: AssocTable,
    record_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<TagRef>>>
where
    E: PgExecutor<'e>,
{
    let mut by_record: HashMap<Uuid, Vec<TagRef>> = HashMap::new();
    if record_ids.is_empty() {
        return Ok(by_record);
    }

    let sql = format!(
        "SELECT a.{fk} AS record_id, t.id, t.name \
         FROM {table} a JOIN tag t ON t.id = a.tag_id \
         WHERE a.{fk} = ANY($1) \
         ORDER BY t.name",
        fk = assoc.record_fk,
        table = assoc.table,
    );
    let rows = sqlx::query(&sql)
        .bind(record_ids)
        .fetch_all(executor)
        .await
        .map_err(Error::Database)?;

    for row in rows {
        by_record
            .entry(row.get("record_id"))
            .or_default()
            .push(TagRef {
                id: row.get("id"),
                name: row.get("name"),
            });
    }
    Ok(by_record)
}

/// Current tags of one record inside a transaction.
pub async fn load_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    assoc: AssocTable,
    record_id: Uuid,
) -> Result<Vec<TagRef>> {
    let mut tags = load_tags_for(&mut **tx, assoc, &[record_id]).await?;
    Ok(tags.remove(&record_id).unwrap_or_default())
}

/// Insert association rows and return the tag ids actually linked.
async fn link_tx(
    tx: &mut Transaction<'_, Postgres>,
    assoc: AssocTable,
    record_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<Vec<Uuid>> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "INSERT INTO {table} ({fk}, tag_id) \
         SELECT $1, tag_id FROM UNNEST($2::uuid[]) AS u(tag_id) ORDER BY tag_id \
         ON CONFLICT DO NOTHING \
         RETURNING tag_id",
        table = assoc.table,
        fk = assoc.record_fk,
    );
    let rows = sqlx::query(&sql)
        .bind(record_id)
        .bind(tag_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(rows.iter().map(|row| row.get("tag_id")).collect())
}

/// Delete association rows and return the tag ids actually unlinked.
async fn unlink_tx(
    tx: &mut Transaction<'_, Postgres>,
    assoc: AssocTable,
    record_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<Vec<Uuid>> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "DELETE FROM {table} WHERE {fk} = $1 AND tag_id = ANY($2) RETURNING tag_id",
        table = assoc.table,
        fk = assoc.record_fk,
    );
    let rows = sqlx::query(&sql)
        .bind(record_id)
        .bind(tag_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(rows.iter().map(|row| row.get("tag_id")).collect())
}

/// Associate canonical tag names with a new record and count the new links.
///
/// Returns the number of associations actually created.
pub async fn attach_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    tags: &PgTagRepository,
    assoc: AssocTable,
    owner_id: Uuid,
    record_id: Uuid,
    names: &[String],
) -> Result<usize> {
    if names.is_empty() {
        return Ok(0);
    }

    let ids: Vec<Uuid> = tags
        .resolve_many_tx(tx, names)
        .await?
        .iter()
        .map(|t| t.id)
        .collect();
    tags.lock_tx(tx, &ids).await?;
    tags.record_usage_tx(tx, owner_id, &ids).await?;

    let linked = link_tx(tx, assoc, record_id, &ids).await?;
    tags.increment_many_tx(tx, &linked).await?;
    Ok(linked.len())
}

/// Reconcile a record's associations with a requested canonical tag set.
///
/// Names are resolved first, then every tag on either side of the diff is
/// locked in one id-ordered statement before any count moves.
pub async fn sync_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    tags: &PgTagRepository,
    assoc: AssocTable,
    owner_id: Uuid,
    record_id: Uuid,
    requested: &[String],
) -> Result<TagDiff> {
    let current = load_tags_tx(tx, assoc, record_id).await?;
    let current_names: Vec<&str> = current.iter().map(|t| t.name.as_str()).collect();

    let diff = diff_tags(&current_names, requested);
    if diff.is_empty() {
        debug!(
            subsystem = "db",
            component = "tagging",
            record_id = %record_id,
            "Tag set unchanged"
        );
        return Ok(diff);
    }

    let added: Vec<Uuid> = tags
        .resolve_many_tx(tx, &diff.to_add)
        .await?
        .iter()
        .map(|t| t.id)
        .collect();
    let removed: Vec<Uuid> = current
        .iter()
        .filter(|t| diff.to_remove.contains(&t.name))
        .map(|t| t.id)
        .collect();

    let touched: Vec<Uuid> = added.iter().chain(&removed).copied().collect();
    tags.lock_tx(tx, &touched).await?;
    tags.record_usage_tx(tx, owner_id, &added).await?;

    let unlinked = unlink_tx(tx, assoc, record_id, &removed).await?;
    tags.decrement_many_tx(tx, &unlinked).await?;
    let linked = link_tx(tx, assoc, record_id, &added).await?;
    tags.increment_many_tx(tx, &linked).await?;

    debug!(
        subsystem = "db",
        component = "tagging",
        record_id = %record_id,
        tags_added = linked.len(),
        tags_removed = unlinked.len(),
        "Reconciled tag set"
    );
    Ok(diff)
}

/// Release every tag a record holds ahead of deleting it.
///
/// The association rows themselves go with the record through
/// `ON DELETE CASCADE`.
pub async fn release_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    tags: &PgTagRepository,
    assoc: AssocTable,
    record_id: Uuid,
) -> Result<usize> {
    let held: Vec<Uuid> = load_tags_tx(tx, assoc, record_id)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();

    tags.decrement_many_tx(tx, &held).await?;
    Ok(held.len())
}
