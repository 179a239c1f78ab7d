//! Connection pool for the vault stores.
//!
//! Every record write holds a single connection for the record row and its
//! tag rows, so the pool is sized by concurrent writers alone. Idle
//! connections close after [`DB_IDLE_TIMEOUT_SECS`].

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use vault_core::defaults::{DB_CONNECT_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS};
use vault_core::{Error, Result};

/// Pool sizing read from `DB_MAX_CONNECTIONS` and `DB_CONNECT_TIMEOUT_SECS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long a writer waits for a free connection.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn options(&self) -> Result<PgPoolOptions> {
        if self.max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be positive".into()));
        }
        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(Duration::from_secs(DB_IDLE_TIMEOUT_SECS)))
    }
}

/// Open a pool against `database_url`.
pub async fn open_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let options = config.options()?;
    let start = Instant::now();

    let pool = options
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "open",
        max_connections = config.max_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool open"
    );
    Ok(pool)
}

/// Point-in-time occupancy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, idle or checked out.
    pub size: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolStats {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: u32::try_from(pool.num_idle()).unwrap_or(u32::MAX),
            max: pool.options().get_max_connections(),
        }
    }

    /// Connections currently held by a transaction or query.
    pub fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }

    /// Every permitted connection is checked out; the next writer waits.
    pub fn saturated(&self) -> bool {
        self.max > 0 && self.in_use() >= self.max
    }

    pub fn log(&self) {
        debug!(
            subsystem = "db",
            component = "pool",
            op = "stats",
            pool_size = self.size,
            pool_idle = self.idle,
            pool_max = self.max,
            "Pool occupancy"
        );
        if self.saturated() {
            warn!(
                subsystem = "db",
                component = "pool",
                pool_max = self.max,
                "Every pool connection is checked out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = PoolConfig::new()
            .max_connections(20)
            .connect_timeout(Duration::from_secs(60));
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(PoolConfig::default().max_connections, DB_MAX_CONNECTIONS);
    }

    #[tokio::test]
    async fn test_zero_connections_rejected_before_connecting() {
        let config = PoolConfig::new().max_connections(0);
        let err = open_pool("postgres://unreachable.invalid/vault", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_stats_saturation() {
        let busy = PoolStats {
            size: 5,
            idle: 0,
            max: 5,
        };
        assert_eq!(busy.in_use(), 5);
        assert!(busy.saturated());

        let warm = PoolStats {
            size: 5,
            idle: 2,
            max: 5,
        };
        assert_eq!(warm.in_use(), 3);
        assert!(!warm.saturated());

        let growing = PoolStats {
            size: 3,
            idle: 0,
            max: 10,
        };
        assert!(!growing.saturated());
    }
}
