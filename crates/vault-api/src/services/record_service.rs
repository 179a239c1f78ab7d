//! Record service: relational writes followed by search index propagation.
//!
//! The relational store is authoritative. A mutation is committed first and
//! only then projected into the search index; a failed propagation never
//! undoes the commit. There is no outbox and no retry: a stale index is
//! repaired with [`RecordService::rebuild_index`].
//!
//! In background mode every service clone feeds one queue drained by a
//! single task, so index operations apply in commit order.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vault_core::defaults::{PAGE_LIMIT_MAX, PAGE_LIMIT_SEARCH};
use vault_core::{
    CreateRecord, Error, RecordFilter, RecordRepository, Result, SearchIndex, SearchProjection,
    SearchQuery, TaggableRecord, UpdateRecord,
};

/// When index propagation runs relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationMode {
    /// Awaited before the call returns; failures are reported in the result.
    #[default]
    Synchronous,
    /// Queued for an ordered background task; the caller does not wait.
    Background,
}

impl FromStr for PropagationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Ok(Self::Synchronous),
            "background" | "async" => Ok(Self::Background),
            other => Err(Error::Config(format!(
                "index sync mode must be sync or background, got {other:?}"
            ))),
        }
    }
}

/// Outcome of propagating a committed mutation into the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSync {
    Applied,
    /// The mutation is committed but the index was not updated.
    Failed(String),
    /// Propagation was queued for the background task.
    Deferred,
}

impl IndexSync {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A committed result together with its index propagation outcome.
#[derive(Debug, Clone)]
pub struct Synced<T> {
    pub value: T,
    pub index: IndexSync,
}

/// Counts from a per-owner index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Projections written from the relational store.
    pub indexed: usize,
    /// Index documents removed because their record no longer exists.
    pub purged: usize,
}

enum IndexOp {
    Upsert(SearchProjection),
    Remove(Uuid),
}

impl IndexOp {
    fn record_id(&self) -> Uuid {
        match self {
            Self::Upsert(p) => p.id,
            Self::Remove(id) => *id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "index",
            Self::Remove(_) => "delete",
        }
    }

    async fn apply(&self, index: &dyn SearchIndex) -> Result<()> {
        match self {
            Self::Upsert(p) => index.index(p.id, p).await,
            Self::Remove(id) => index.delete(*id).await,
        }
    }
}

/// Orchestrates one record kind across the relational store and the index.
pub struct RecordService<R: TaggableRecord> {
    repo: Arc<dyn RecordRepository<R>>,
    index: Arc<dyn SearchIndex>,
    mode: PropagationMode,
    /// Started on first background propagation, shared by every clone.
    queue: Arc<OnceLock<mpsc::UnboundedSender<IndexOp>>>,
}

impl<R: TaggableRecord> Clone for RecordService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            index: Arc::clone(&self.index),
            mode: self.mode,
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<R: TaggableRecord> RecordService<R> {
    pub fn new(
        repo: Arc<dyn RecordRepository<R>>,
        index: Arc<dyn SearchIndex>,
        mode: PropagationMode,
    ) -> Self {
        Self {
            repo,
            index,
            mode,
            queue: Arc::new(OnceLock::new()),
        }
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    /// Create a record, then project it into the index.
    pub async fn create(&self, req: CreateRecord<R::Fields>) -> Result<Synced<R>> {
        let record = self.repo.create(req).await?;
        let index = self.propagate(IndexOp::Upsert(record.to_projection())).await;
        Ok(Synced {
            value: record,
            index,
        })
    }

    /// Update a record, then re-project it with its resolved tags.
    pub async fn update(&self, id: Uuid, req: UpdateRecord<R::Fields>) -> Result<Synced<R>> {
        let record = self.repo.update(id, req).await?;
        let index = self.propagate(IndexOp::Upsert(record.to_projection())).await;
        Ok(Synced {
            value: record,
            index,
        })
    }

    /// Delete a record, then drop its projection.
    pub async fn delete(&self, id: Uuid) -> Result<Synced<()>> {
        self.repo.delete(id).await?;
        let index = self.propagate(IndexOp::Remove(id)).await;
        Ok(Synced { value: (), index })
    }

    pub async fn get(&self, id: Uuid) -> Result<R> {
        self.repo.get(id).await
    }

    pub async fn get_by_natural_key(&self, owner_id: Uuid, key: &str) -> Result<R> {
        self.repo.get_by_natural_key(owner_id, key).await
    }

    pub async fn list(&self, filter: RecordFilter) -> Result<Vec<R>> {
        self.repo.list(filter).await
    }

    /// Owner-scoped text search answered entirely from the index.
    ///
    /// Hits are rebuilt from stored projection fields and may lag the
    /// relational store.
    pub async fn search(&self, owner_id: Uuid, text: &str, limit: Option<usize>) -> Result<Vec<R>> {
        if owner_id.is_nil() {
            return Err(Error::InvalidArgument("search requires an owner".into()));
        }
        let limit = limit
            .unwrap_or(PAGE_LIMIT_SEARCH as usize)
            .min(PAGE_LIMIT_MAX as usize);

        let start = Instant::now();
        let hits = self
            .index
            .query(&SearchQuery {
                owner_id,
                kind: R::KIND,
                text: text.to_string(),
                limit,
            })
            .await?;

        debug!(
            subsystem = "service",
            component = "search",
            op = "query",
            record_kind = %R::KIND,
            owner_id = %owner_id,
            result_count = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        hits.into_iter().map(R::from_projection).collect()
    }

    /// Re-project every record of an owner and purge orphaned index entries.
    pub async fn rebuild_index(&self, owner_id: Uuid) -> Result<RebuildReport> {
        let start = Instant::now();
        let mut report = RebuildReport::default();
        let mut live = HashSet::new();

        let mut offset = 0;
        loop {
            let page = self
                .repo
                .list(
                    RecordFilter::for_owner(owner_id)
                        .with_limit(PAGE_LIMIT_MAX)
                        .with_offset(offset),
                )
                .await?;
            for record in &page {
                self.index.index(record.id(), &record.to_projection()).await?;
                live.insert(record.id());
            }
            report.indexed += page.len();
            if (page.len() as i64) < PAGE_LIMIT_MAX {
                break;
            }
            offset += PAGE_LIMIT_MAX;
        }

        // Each pass either removes something or finds nothing stale.
        loop {
            let hits = self
                .index
                .query(&SearchQuery {
                    owner_id,
                    kind: R::KIND,
                    text: String::new(),
                    limit: live.len() + PAGE_LIMIT_MAX as usize,
                })
                .await?;
            let stale: Vec<Uuid> = hits
                .iter()
                .map(|p| p.id)
                .filter(|id| !live.contains(id))
                .collect();
            if stale.is_empty() {
                break;
            }
            for id in &stale {
                self.index.delete(*id).await?;
            }
            report.purged += stale.len();
        }

        info!(
            subsystem = "service",
            component = "sync",
            op = "rebuild",
            record_kind = %R::KIND,
            owner_id = %owner_id,
            indexed = report.indexed,
            purged = report.purged,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search index rebuilt"
        );
        Ok(report)
    }

    async fn propagate(&self, op: IndexOp) -> IndexSync {
        match self.mode {
            PropagationMode::Synchronous => match op.apply(self.index.as_ref()).await {
                Ok(()) => IndexSync::Applied,
                Err(e) => {
                    log_failure::<R>(&op, &e);
                    IndexSync::Failed(e.to_string())
                }
            },
            PropagationMode::Background => {
                let queue = self
                    .queue
                    .get_or_init(|| spawn_index_worker::<R>(Arc::clone(&self.index)));
                match queue.send(op) {
                    Ok(()) => IndexSync::Deferred,
                    Err(mpsc::error::SendError(op)) => {
                        let e = Error::Internal("index worker stopped".into());
                        log_failure::<R>(&op, &e);
                        IndexSync::Failed(e.to_string())
                    }
                }
            }
        }
    }
}

/// Apply queued operations one at a time until every sender is dropped.
fn spawn_index_worker<R: TaggableRecord>(
    index: Arc<dyn SearchIndex>,
) -> mpsc::UnboundedSender<IndexOp> {
    let (tx, mut rx) = mpsc::unbounded_channel::<IndexOp>();
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            if let Err(e) = op.apply(index.as_ref()).await {
                log_failure::<R>(&op, &e);
            }
        }
        debug!(
            subsystem = "service",
            component = "sync",
            record_kind = %R::KIND,
            "Index worker stopped"
        );
    });
    tx
}

fn log_failure<R: TaggableRecord>(op: &IndexOp, e: &Error) {
    warn!(
        subsystem = "service",
        component = "sync",
        op = op.name(),
        record_kind = %R::KIND,
        record_id = %op.record_id(),
        error = %e,
        "Search index propagation failed; record is committed"
    );
}
