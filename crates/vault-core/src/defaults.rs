//! Centralized default constants for vault.
//!
//! Single source of truth for shared default values. Crates reference these
//! instead of defining their own magic numbers.

// =============================================================================
// TAGS
// =============================================================================

/// Maximum length (in characters) of a canonical tag name.
pub const TAG_NAME_MAX_LEN: usize = 100;

/// Default number of tags returned by popularity ranking.
pub const POPULAR_TAGS_LIMIT: i64 = 10;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for record list endpoints.
pub const PAGE_LIMIT: i64 = 50;

/// Upper bound for any list page.
pub const PAGE_LIMIT_MAX: i64 = 500;

/// Default page size for full-text search.
pub const PAGE_LIMIT_SEARCH: i64 = 20;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum pool connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default pool acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle connection timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Heap budget handed to the index writer (tantivy requires at least 15 MB).
pub const SEARCH_WRITER_HEAP_BYTES: usize = 50_000_000;

/// Boost applied to title matches relative to body matches.
pub const SEARCH_TITLE_BOOST: f32 = 2.0;

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Requests allowed per client per period.
pub const RATE_LIMIT_REQUESTS: u32 = 100;

/// Rate limiting period in seconds (one hour).
pub const RATE_LIMIT_PERIOD_SECS: u64 = 3600;

/// How often idle limiter entries are evicted, in seconds.
pub const RATE_LIMIT_EVICT_INTERVAL_SECS: u64 = 60;
