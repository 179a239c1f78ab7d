//! Environment configuration.
//!
//! Every setting is read from an environment variable with a default from
//! `vault_core::defaults`. Call `dotenvy::dotenv()` first to pick up a `.env`
//! file.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | required |
//! | `DB_MAX_CONNECTIONS` | 10 |
//! | `DB_CONNECT_TIMEOUT_SECS` | 30 |
//! | `SEARCH_INDEX_PATH` | unset (in-memory index) |
//! | `SEARCH_WRITER_HEAP_BYTES` | 50000000 |
//! | `INDEX_SYNC_MODE` | `sync` (`sync` or `background`) |
//! | `RATE_LIMIT_REQUESTS` | 100 |
//! | `RATE_LIMIT_PERIOD_SECS` | 3600 |
//! | `REINDEX_OWNER` | unset |
//! | `LOG_FORMAT` | `text` (`text` or `json`) |
//! | `LOG_FILE` | unset (stdout) |
//! | `LOG_ANSI` | auto |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use vault_core::defaults;
use vault_core::{Error, Result};
use vault_db::PoolConfig;

use crate::services::PropagationMode;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("LOG_FORMAT must be text or json, got {other:?}"))),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Daily-rolling log file; stdout when unset.
    pub file: Option<PathBuf>,
    /// ANSI color override; auto-detected when unset.
    pub ansi: Option<bool>,
}

/// Per-client request limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per period.
    pub requests: u32,
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: defaults::RATE_LIMIT_REQUESTS,
            period: Duration::from_secs(defaults::RATE_LIMIT_PERIOD_SECS),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub database_url: String,
    pub pool: PoolConfig,
    /// On-disk index directory; in-memory index when unset.
    pub search_index_path: Option<PathBuf>,
    pub search_writer_heap_bytes: usize,
    pub sync_mode: PropagationMode,
    pub rate_limit: RateLimitConfig,
    /// Owner whose index is rebuilt at startup.
    pub reindex_owner: Option<Uuid>,
    pub log: LogConfig,
}

impl VaultConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL must be set".into()))?;

        let pool = PoolConfig::new()
            .max_connections(parse_or(
                &var,
                "DB_MAX_CONNECTIONS",
                defaults::DB_MAX_CONNECTIONS,
            )?)
            .connect_timeout(Duration::from_secs(parse_or(
                &var,
                "DB_CONNECT_TIMEOUT_SECS",
                defaults::DB_CONNECT_TIMEOUT_SECS,
            )?));
        if pool.max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be positive".into()));
        }

        let rate_limit = RateLimitConfig {
            requests: parse_or(&var, "RATE_LIMIT_REQUESTS", defaults::RATE_LIMIT_REQUESTS)?,
            period: Duration::from_secs(parse_or(
                &var,
                "RATE_LIMIT_PERIOD_SECS",
                defaults::RATE_LIMIT_PERIOD_SECS,
            )?),
        };

        let log = LogConfig {
            format: parse_or(&var, "LOG_FORMAT", LogFormat::Text)?,
            file: var("LOG_FILE").map(PathBuf::from),
            ansi: var("LOG_ANSI").map(|v| v == "true" || v == "1"),
        };

        Ok(Self {
            database_url,
            pool,
            search_index_path: var("SEARCH_INDEX_PATH").map(PathBuf::from),
            search_writer_heap_bytes: parse_or(
                &var,
                "SEARCH_WRITER_HEAP_BYTES",
                defaults::SEARCH_WRITER_HEAP_BYTES,
            )?,
            sync_mode: parse_or(&var, "INDEX_SYNC_MODE", PropagationMode::Synchronous)?,
            rate_limit,
            reindex_owner: var("REINDEX_OWNER").map(|v| parse(&v, "REINDEX_OWNER")).transpose()?,
            log,
        })
    }
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {key} {raw:?}: {e}")))
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |raw| parse(&raw, key))
}
