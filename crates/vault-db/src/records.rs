//! Generic record repository for taggable records.
//!
//! Each record kind describes its table through [`RecordTable`]; the create,
//! update and delete transactions, including the tag lifecycle, are written
//! once in [`PgRecordRepository`].

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use vault_core::defaults::{PAGE_LIMIT, PAGE_LIMIT_MAX};
use vault_core::{
    new_v7, normalize_tag_name, normalize_tag_set, CreateRecord, Error, RecordFields,
    RecordFilter, RecordRepository, Result, TagRef, TaggableRecord, UpdateRecord,
};

use crate::tagging::{self, AssocTable};
use crate::tags::PgTagRepository;

/// A query with positional Postgres arguments.
pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Relational layout of one record kind.
pub trait RecordTable: TaggableRecord {
    /// Record table name.
    const TABLE: &'static str;
    /// Association table linking records to tags.
    const TAGS: AssocTable;
    /// Content columns, in the order [`RecordTable::bind_fields`] binds them.
    const FIELD_COLUMNS: &'static [&'static str];
    /// Column holding the owner-scoped natural key.
    const NATURAL_KEY_COLUMN: &'static str;
    /// Name of the `(owner_id, natural key)` unique constraint.
    const UNIQUE_CONSTRAINT: &'static str;

    fn fields_from_row(row: &PgRow) -> Self::Fields;

    fn bind_fields<'q>(query: PgQuery<'q>, fields: &'q Self::Fields) -> PgQuery<'q>;
}

fn select_sql<R: RecordTable>(tail: &str) -> String {
    let columns: Vec<String> = R::FIELD_COLUMNS
        .iter()
        .map(|c| format!("r.{c}"))
        .collect();
    format!(
        "SELECT r.id, r.owner_id, r.created_at, {} FROM {} r {}",
        columns.join(", "),
        R::TABLE,
        tail
    )
}

fn insert_sql<R: RecordTable>() -> String {
    let placeholders: Vec<String> = (0..R::FIELD_COLUMNS.len())
        .map(|i| format!("${}", i + 3))
        .collect();
    format!(
        "INSERT INTO {} (id, owner_id, {}) VALUES ($1, $2, {}) RETURNING created_at",
        R::TABLE,
        R::FIELD_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

fn update_sql<R: RecordTable>() -> String {
    let assignments: Vec<String> = R::FIELD_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ${}", i + 2))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = $1",
        R::TABLE,
        assignments.join(", ")
    )
}

fn record_from_row<R: RecordTable>(row: &PgRow, tags: Vec<TagRef>) -> R {
    R::from_parts(
        row.get("id"),
        row.get("owner_id"),
        R::fields_from_row(row),
        tags,
        row.get("created_at"),
    )
}

fn already_exists<R: RecordTable>(key: &str) -> Error {
    Error::AlreadyExists(format!(
        "{} with {} '{}' already exists",
        R::KIND,
        R::NATURAL_KEY_COLUMN,
        key
    ))
}

/// Map a unique-constraint violation on the natural key to `AlreadyExists`.
fn map_unique_violation<R: RecordTable>(e: sqlx::Error, key: &str) -> Error {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.constraint() == Some(R::UNIQUE_CONSTRAINT) {
            return already_exists::<R>(key);
        }
    }
    Error::Database(e)
}

/// Fetch records with their tags, newest first.
///
/// `tags` matches records carrying any of the canonical names.
/// `limit: None` returns every match.
pub(crate) async fn fetch_records<R: RecordTable>(
    pool: &Pool<Postgres>,
    owner_id: Option<Uuid>,
    tags: Option<&[String]>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<R>> {
    let sql = select_sql::<R>(&format!(
        "WHERE ($1::uuid IS NULL OR r.owner_id = $1) \
         AND ($2::text[] IS NULL OR EXISTS ( \
             SELECT 1 FROM {table} a JOIN tag t ON t.id = a.tag_id \
             WHERE a.{fk} = r.id AND t.name = ANY($2))) \
         ORDER BY r.created_at DESC, r.id DESC \
         LIMIT $3 OFFSET $4",
        table = R::TAGS.table,
        fk = R::TAGS.record_fk,
    ));

    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(tags.map(<[String]>::to_vec))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(Error::Database)?;

    let ids: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
    let mut by_record = tagging::load_tags_for(pool, R::TAGS, &ids).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            record_from_row::<R>(row, by_record.remove(&id).unwrap_or_default())
        })
        .collect())
}

/// PostgreSQL implementation of RecordRepository for one record kind.
#[derive(Clone)]
pub struct PgRecordRepository<R> {
    pool: Pool<Postgres>,
    tags: PgTagRepository,
    _kind: PhantomData<fn() -> R>,
}

impl<R: RecordTable> PgRecordRepository<R> {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            tags: PgTagRepository::new(pool.clone()),
            pool,
            _kind: PhantomData,
        }
    }

    /// Fail with `AlreadyExists` when another record of the owner holds `key`.
    async fn ensure_key_free_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: Uuid,
        key: &str,
        except: Option<Uuid>,
    ) -> Result<()> {
        let sql = format!(
            "SELECT id FROM {} WHERE owner_id = $1 AND {} = $2",
            R::TABLE,
            R::NATURAL_KEY_COLUMN
        );
        let existing: Option<Uuid> = sqlx::query_scalar(&sql)
            .bind(owner_id)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;

        match existing {
            Some(id) if Some(id) != except => Err(already_exists::<R>(key)),
            _ => Ok(()),
        }
    }

    /// Lock a record row for the rest of the transaction.
    async fn lock_tx(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<PgRow> {
        let sql = select_sql::<R>("WHERE r.id = $1 FOR UPDATE");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("{} {}", R::KIND, id)))
    }

    /// Run a single-row select built with [`select_sql`] and attach the tags.
    async fn fetch_one(&self, query: PgQuery<'_>) -> Result<Option<R>> {
        let Some(row) = query
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
        else {
            return Ok(None);
        };

        let id: Uuid = row.get("id");
        let mut tags = tagging::load_tags_for(&self.pool, R::TAGS, &[id]).await?;
        Ok(Some(record_from_row::<R>(
            &row,
            tags.remove(&id).unwrap_or_default(),
        )))
    }
}

#[async_trait]
impl<R: RecordTable> RecordRepository<R> for PgRecordRepository<R> {
    async fn create(&self, req: CreateRecord<R::Fields>) -> Result<R> {
        req.fields.validate()?;
        let names = normalize_tag_set(&req.tags)?;
        let key = req.fields.natural_key();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        self.ensure_key_free_tx(&mut tx, req.owner_id, key, None).await?;

        let id = new_v7();
        let sql = insert_sql::<R>();
        let created_at = R::bind_fields(
            sqlx::query(&sql).bind(id).bind(req.owner_id),
            &req.fields,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation::<R>(e, key))?
        .get("created_at");

        tagging::attach_tags_tx(&mut tx, &self.tags, R::TAGS, req.owner_id, id, &names)
            .await?;
        let tags = tagging::load_tags_tx(&mut tx, R::TAGS, id).await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "records",
            op = "create",
            record_kind = %R::KIND,
            record_id = %id,
            tag_count = tags.len(),
            "Record created"
        );
        Ok(R::from_parts(id, req.owner_id, req.fields, tags, created_at))
    }

    async fn get(&self, id: Uuid) -> Result<R> {
        let sql = select_sql::<R>("WHERE r.id = $1");
        self.fetch_one(sqlx::query(&sql).bind(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {}", R::KIND, id)))
    }

    async fn get_by_natural_key(&self, owner_id: Uuid, key: &str) -> Result<R> {
        let sql = select_sql::<R>(&format!(
            "WHERE r.owner_id = $1 AND r.{} = $2",
            R::NATURAL_KEY_COLUMN
        ));
        self.fetch_one(sqlx::query(&sql).bind(owner_id).bind(key))
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "{} with {} '{}'",
                    R::KIND,
                    R::NATURAL_KEY_COLUMN,
                    key
                ))
            })
    }

    async fn update(&self, id: Uuid, req: UpdateRecord<R::Fields>) -> Result<R> {
        req.fields.validate()?;
        let requested = req
            .tags
            .as_deref()
            .map(normalize_tag_set::<String>)
            .transpose()?;
        let key = req.fields.natural_key();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = self.lock_tx(&mut tx, id).await?;
        let current = record_from_row::<R>(&row, Vec::new());
        if current.natural_key() != key {
            self.ensure_key_free_tx(&mut tx, current.owner_id(), key, Some(id))
                .await?;
        }

        let sql = update_sql::<R>();
        R::bind_fields(sqlx::query(&sql).bind(id), &req.fields)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation::<R>(e, key))?;

        if let Some(requested) = &requested {
            tagging::sync_tags_tx(
                &mut tx,
                &self.tags,
                R::TAGS,
                current.owner_id(),
                id,
                requested,
            )
            .await?;
        }
        let tags = tagging::load_tags_tx(&mut tx, R::TAGS, id).await?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "records",
            op = "update",
            record_kind = %R::KIND,
            record_id = %id,
            tag_count = tags.len(),
            tags_reconciled = requested.is_some(),
            "Record updated"
        );
        Ok(R::from_parts(
            id,
            current.owner_id(),
            req.fields,
            tags,
            current.created_at(),
        ))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        self.lock_tx(&mut tx, id).await?;
        let released = tagging::release_tags_tx(&mut tx, &self.tags, R::TAGS, id).await?;

        let sql = format!("DELETE FROM {} WHERE id = $1", R::TABLE);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} {}", R::KIND, id)));
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "records",
            op = "delete",
            record_kind = %R::KIND,
            record_id = %id,
            tag_count = released,
            "Record deleted"
        );
        Ok(())
    }

    async fn list(&self, filter: RecordFilter) -> Result<Vec<R>> {
        let limit = filter.limit.unwrap_or(PAGE_LIMIT);
        if limit <= 0 {
            return Err(Error::InvalidArgument(format!(
                "limit must be positive, got {limit}"
            )));
        }
        let offset = filter.offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::InvalidArgument(format!(
                "offset must not be negative, got {offset}"
            )));
        }
        let tag: Option<Vec<String>> = filter
            .tag
            .as_deref()
            .map(normalize_tag_name)
            .filter(|t| !t.is_empty())
            .map(|t| vec![t]);

        fetch_records::<R>(
            &self.pool,
            filter.owner_id,
            tag.as_deref(),
            Some(limit.min(PAGE_LIMIT_MAX)),
            Some(offset),
        )
        .await
    }
}
