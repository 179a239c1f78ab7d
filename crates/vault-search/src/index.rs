//! Tantivy-backed search index for record projections.
//!
//! The index is a derived, non-authoritative copy of committed records. Every
//! write commits immediately and reloads the reader so a query issued after
//! `index` or `delete` returns sees the change.

use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value};
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument,
    Term,
};
use tracing::{debug, info, trace};
use uuid::Uuid;

use vault_core::defaults::{SEARCH_TITLE_BOOST, SEARCH_WRITER_HEAP_BYTES};
use vault_core::{Error, RecordKind, Result, SearchIndex, SearchProjection, SearchQuery};

use crate::schema::{build_schema, configure_tokenizers, fields};

fn search_err(e: impl Display) -> Error {
    Error::Search(e.to_string())
}

/// Field handles resolved once from the schema.
#[derive(Debug, Clone, Copy)]
struct IndexFields {
    id: Field,
    kind: Field,
    owner_id: Field,
    url: Field,
    title: Field,
    body: Field,
    tag_ids: Field,
    tag_names: Field,
    created_at: Field,
}

impl IndexFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let field = |name: &str| schema.get_field(name).map_err(search_err);
        Ok(Self {
            id: field(fields::ID)?,
            kind: field(fields::KIND)?,
            owner_id: field(fields::OWNER_ID)?,
            url: field(fields::URL)?,
            title: field(fields::TITLE)?,
            body: field(fields::BODY)?,
            tag_ids: field(fields::TAG_IDS)?,
            tag_names: field(fields::TAG_NAMES)?,
            created_at: field(fields::CREATED_AT)?,
        })
    }
}

struct Inner {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: IndexFields,
}

/// Embedded full-text index over bookmark and note projections.
#[derive(Clone)]
pub struct TantivySearchIndex {
    inner: Arc<Inner>,
}

impl TantivySearchIndex {
    /// Create or open an on-disk index at `path`.
    pub fn open(path: &Path, writer_heap_bytes: usize) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let directory = MmapDirectory::open(path).map_err(search_err)?;
        let index = Index::open_or_create(directory, build_schema()).map_err(search_err)?;

        info!(
            subsystem = "search",
            component = "tantivy",
            op = "open",
            path = %path.display(),
            "Opened search index"
        );
        Self::from_index(index, writer_heap_bytes)
    }

    /// Create an in-memory index.
    pub fn in_memory() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        debug!(
            subsystem = "search",
            component = "tantivy",
            op = "open",
            "Created in-memory search index"
        );
        Self::from_index(index, SEARCH_WRITER_HEAP_BYTES)
    }

    fn from_index(index: Index, writer_heap_bytes: usize) -> Result<Self> {
        configure_tokenizers(&index);
        let fields = IndexFields::resolve(&index.schema())?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(search_err)?;

        // One indexing thread: writes are serialized behind the mutex anyway.
        let writer = index
            .writer_with_num_threads(1, writer_heap_bytes)
            .map_err(search_err)?;

        Ok(Self {
            inner: Arc::new(Inner {
                index,
                reader,
                writer: Mutex::new(writer),
                fields,
            }),
        })
    }

    /// Number of live documents visible to searchers.
    pub fn num_docs(&self) -> u64 {
        self.inner.reader.searcher().num_docs()
    }

    /// Run blocking index work off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| Error::Internal(format!("search task failed: {e}")))?
    }
}

impl Inner {
    fn write<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut IndexWriter, &IndexFields) -> Result<()>,
    {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Internal("search writer lock poisoned".into()))?;
        op(&mut writer, &self.fields)?;
        writer.commit().map_err(search_err)?;
        self.reader.reload().map_err(search_err)
    }

    fn to_document(&self, id: Uuid, projection: &SearchProjection) -> TantivyDocument {
        let f = &self.fields;
        let mut doc = TantivyDocument::new();

        doc.add_text(f.id, id.to_string());
        doc.add_text(f.kind, projection.kind.as_str());
        doc.add_text(f.owner_id, projection.owner_id.to_string());
        if let Some(url) = &projection.url {
            doc.add_text(f.url, url);
        }
        doc.add_text(f.title, &projection.title);
        doc.add_text(f.body, &projection.body);
        for (tag_id, name) in projection.tag_ids.iter().zip(&projection.tag_names) {
            doc.add_text(f.tag_ids, tag_id.to_string());
            doc.add_text(f.tag_names, name);
        }
        doc.add_i64(f.created_at, projection.created_at.timestamp_micros());
        doc
    }

    fn build_query(&self, query: &SearchQuery) -> Box<dyn Query> {
        let f = &self.fields;
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(f.owner_id, &query.owner_id.to_string()),
                    IndexRecordOption::Basic,
                )),
            ),
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(f.kind, query.kind.as_str()),
                    IndexRecordOption::Basic,
                )),
            ),
        ];

        let text = query.text.trim();
        if !text.is_empty() {
            let mut parser = QueryParser::for_index(&self.index, vec![f.title, f.body]);
            parser.set_field_boost(f.title, SEARCH_TITLE_BOOST);
            let (parsed, errors) = parser.parse_query_lenient(text);
            if !errors.is_empty() {
                debug!(
                    subsystem = "search",
                    component = "tantivy",
                    op = "query",
                    ignored = errors.len(),
                    "Query text parsed leniently"
                );
            }
            clauses.push((Occur::Must, parsed));
        }

        Box::new(BooleanQuery::new(clauses))
    }

    fn read_projection(&self, searcher: &Searcher, address: DocAddress) -> Result<SearchProjection> {
        let f = &self.fields;
        let doc: TantivyDocument = searcher.doc(address).map_err(search_err)?;

        let text = |field: Field| -> Option<String> {
            doc.get_first(field).and_then(|v| v.as_str()).map(String::from)
        };
        let required = |field: Field, name: &str| -> Result<String> {
            text(field).ok_or_else(|| Error::Search(format!("indexed document missing {name}")))
        };
        let parse_uuid = |raw: &str| Uuid::parse_str(raw).map_err(search_err);

        let kind: RecordKind = required(f.kind, fields::KIND)?
            .parse()
            .map_err(Error::Search)?;
        let micros = doc
            .get_first(f.created_at)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::Search("indexed document missing created_at".into()))?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or_else(|| Error::Search(format!("created_at out of range: {micros}")))?;

        let tag_ids = doc
            .get_all(f.tag_ids)
            .filter_map(|v| v.as_str())
            .map(parse_uuid)
            .collect::<Result<Vec<_>>>()?;
        let tag_names = doc
            .get_all(f.tag_names)
            .filter_map(|v| v.as_str())
            .map(String::from)
            .collect();

        Ok(SearchProjection {
            id: parse_uuid(&required(f.id, fields::ID)?)?,
            kind,
            owner_id: parse_uuid(&required(f.owner_id, fields::OWNER_ID)?)?,
            title: text(f.title).unwrap_or_default(),
            body: text(f.body).unwrap_or_default(),
            url: text(f.url),
            tag_names,
            tag_ids,
            created_at,
        })
    }
}

#[async_trait]
impl SearchIndex for TantivySearchIndex {
    async fn index(&self, id: Uuid, projection: &SearchProjection) -> Result<()> {
        let projection = projection.clone();
        self.blocking(move |inner| {
            let doc = inner.to_document(id, &projection);
            inner.write(|writer, f| {
                writer.delete_term(Term::from_field_text(f.id, &id.to_string()));
                writer.add_document(doc).map_err(search_err)?;
                Ok(())
            })
        })
        .await?;

        debug!(
            subsystem = "search",
            component = "tantivy",
            op = "index",
            record_id = %id,
            "Indexed record projection"
        );
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.blocking(move |inner| {
            inner.write(|writer, f| {
                writer.delete_term(Term::from_field_text(f.id, &id.to_string()));
                Ok(())
            })
        })
        .await?;

        debug!(
            subsystem = "search",
            component = "tantivy",
            op = "delete",
            record_id = %id,
            "Removed record projection"
        );
        Ok(())
    }

    async fn query(&self, query: &SearchQuery) -> Result<Vec<SearchProjection>> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let query = query.clone();
        let start = Instant::now();

        let hits = self
            .blocking(move |inner| {
                let searcher = inner.reader.searcher();
                let collector = TopDocs::with_limit(query.limit)
                    .order_by_fast_field::<i64>(fields::CREATED_AT, Order::Desc);
                let top = searcher
                    .search(&*inner.build_query(&query), &collector)
                    .map_err(search_err)?;

                top.into_iter()
                    .map(|(_, address)| inner.read_projection(&searcher, address))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;

        trace!(
            subsystem = "search",
            component = "tantivy",
            op = "query",
            result_count = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn projection(owner: Uuid, kind: RecordKind, title: &str, body: &str) -> SearchProjection {
        SearchProjection {
            id: Uuid::now_v7(),
            kind,
            owner_id: owner,
            title: title.into(),
            body: body.into(),
            url: match kind {
                RecordKind::Bookmark => Some(format!("https://example.com/{title}")),
                RecordKind::Note => None,
            },
            tag_names: vec!["go".into(), "rust".into()],
            tag_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            created_at: DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap(),
        }
    }

    fn query(owner: Uuid, kind: RecordKind, text: &str) -> SearchQuery {
        SearchQuery {
            owner_id: owner,
            kind,
            text: text.into(),
            limit: 10,
        }
    }

    async fn put(index: &TantivySearchIndex, p: &SearchProjection) {
        index.index(p.id, p).await.unwrap();
    }

    #[tokio::test]
    async fn test_index_then_query_returns_stored_projection() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        let p = projection(owner, RecordKind::Bookmark, "Rust", "systems language");
        put(&index, &p).await;

        let hits = index.query(&query(owner, RecordKind::Bookmark, "language")).await.unwrap();
        assert_eq!(hits, vec![p]);
    }

    #[tokio::test]
    async fn test_reindex_replaces_previous_projection() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        let mut p = projection(owner, RecordKind::Note, "draft", "first body");
        put(&index, &p).await;

        p.body = "second body".into();
        p.tag_names = vec!["edited".into()];
        p.tag_ids = vec![Uuid::new_v4()];
        put(&index, &p).await;

        assert_eq!(index.num_docs(), 1);
        let hits = index.query(&query(owner, RecordKind::Note, "")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, "second body");
        assert_eq!(hits[0].tag_names, vec!["edited"]);
    }

    #[tokio::test]
    async fn test_delete_removes_and_tolerates_missing() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        let p = projection(owner, RecordKind::Note, "gone", "soon");
        put(&index, &p).await;

        index.delete(p.id).await.unwrap();
        index.delete(p.id).await.unwrap();
        index.delete(Uuid::new_v4()).await.unwrap();

        assert!(index.query(&query(owner, RecordKind::Note, "")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_scoped_to_owner_and_kind() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        put(&index, &projection(alice, RecordKind::Note, "shared", "word")).await;
        put(&index, &projection(alice, RecordKind::Bookmark, "shared", "word")).await;
        put(&index, &projection(bob, RecordKind::Note, "shared", "word")).await;

        let hits = index.query(&query(alice, RecordKind::Note, "word")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner_id, alice);
        assert_eq!(hits[0].kind, RecordKind::Note);
    }

    #[tokio::test]
    async fn test_results_sorted_newest_first() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        let mut old = projection(owner, RecordKind::Note, "old", "match");
        old.created_at -= Duration::hours(2);
        let mut mid = projection(owner, RecordKind::Note, "match", "mid");
        mid.created_at -= Duration::hours(1);
        let new = projection(owner, RecordKind::Note, "new", "match");
        for p in [&mid, &new, &old] {
            put(&index, p).await;
        }

        let ids: Vec<_> = index
            .query(&query(owner, RecordKind::Note, "match"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![new.id, mid.id, old.id]);
    }

    #[tokio::test]
    async fn test_query_stems_and_ignores_case() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        let p = projection(owner, RecordKind::Note, "Running notes", "");
        put(&index, &p).await;

        let hits = index.query(&query(owner, RecordKind::Note, "RUNS")).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_truncates_and_zero_is_empty() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        for i in 0..5 {
            put(&index, &projection(owner, RecordKind::Note, &format!("n{i}"), "x")).await;
        }

        let mut q = query(owner, RecordKind::Note, "");
        q.limit = 3;
        assert_eq!(index.query(&q).await.unwrap().len(), 3);
        q.limit = 0;
        assert!(index.query(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_query_text_does_not_error() {
        let index = TantivySearchIndex::in_memory().unwrap();
        let owner = Uuid::new_v4();
        put(&index, &projection(owner, RecordKind::Note, "title", "body")).await;

        assert!(index
            .query(&query(owner, RecordKind::Note, "title:(\"unclosed"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_on_disk_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let owner = Uuid::new_v4();
        let p = projection(owner, RecordKind::Bookmark, "persisted", "on disk");
        {
            let index = TantivySearchIndex::open(dir.path(), SEARCH_WRITER_HEAP_BYTES).unwrap();
            put(&index, &p).await;
        }

        let reopened = TantivySearchIndex::open(dir.path(), SEARCH_WRITER_HEAP_BYTES).unwrap();
        let hits = reopened
            .query(&query(owner, RecordKind::Bookmark, "persisted"))
            .await
            .unwrap();
        assert_eq!(hits, vec![p]);
    }
}
