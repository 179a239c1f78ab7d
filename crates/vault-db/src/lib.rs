//! # vault-db
//!
//! PostgreSQL storage layer for vault.
//!
//! This crate provides:
//! - Connection pool management
//! - The reference-counted tag store
//! - Bookmark and note repositories sharing one tag lifecycle
//!
//! ## Example
//!
//! ```rust,ignore
//! use vault_db::{CreateRecord, Database, NoteFields, RecordRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/vault").await?;
//!
//!     let note = db.notes.create(CreateRecord {
//!         owner_id: uuid::Uuid::now_v7(),
//!         fields: NoteFields { title: "Hello".into(), content: "world".into() },
//!         tags: vec!["Greeting".into()],
//!     }).await?;
//!
//!     println!("Created note {} tagged {:?}", note.id, note.tags);
//!     Ok(())
//! }
//! ```

pub mod bookmarks;
pub mod notes;
pub mod pool;
pub mod records;
pub mod tagging;
pub mod tags;

// Always compiled so integration tests (in tests/) can share the fixtures.
pub mod test_fixtures;

// Re-export core types
pub use vault_core::*;

pub use bookmarks::PgBookmarkRepository;
pub use notes::PgNoteRepository;
pub use pool::{open_pool, PoolConfig, PoolStats};
pub use records::{PgRecordRepository, RecordTable};
pub use tags::PgTagRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Shared, reference-counted tags.
    pub tags: PgTagRepository,
    /// Bookmarks keyed by owner and url.
    pub bookmarks: PgBookmarkRepository,
    /// Notes keyed by owner and title.
    pub notes: PgNoteRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            tags: PgTagRepository::new(pool.clone()),
            bookmarks: PgBookmarkRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool sizing.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, &PoolConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: &PoolConfig) -> Result<Self> {
        let pool = open_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats::of(&self.pool)
    }
}
