//! vault bootstrap binary.
//!
//! Loads configuration, installs tracing, connects the stores and keeps the
//! service container alive until Ctrl-C. Set `REINDEX_OWNER` to rebuild one
//! owner's search index entries at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use vault_api::logging::init_tracing;
use vault_api::{Vault, VaultConfig};
use vault_core::defaults::RATE_LIMIT_EVICT_INTERVAL_SECS;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let config = VaultConfig::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(&config.log).context("failed to initialize logging")?;

    info!(
        rate_limit_requests = config.rate_limit.requests,
        rate_limit_period_secs = config.rate_limit.period.as_secs(),
        db_max_connections = config.pool.max_connections,
        "Starting vault"
    );

    let vault = Vault::connect(&config)
        .await
        .context("failed to start vault services")?;

    if let Some(owner_id) = config.reindex_owner {
        match vault.rebuild_index(owner_id).await {
            Ok(report) => info!(
                owner_id = %owner_id,
                indexed = report.indexed,
                purged = report.purged,
                "Startup reindex complete"
            ),
            Err(e) => error!(owner_id = %owner_id, error = %e, "Startup reindex failed"),
        }
    }

    let eviction = Arc::clone(&vault.limiter)
        .spawn_eviction(Duration::from_secs(RATE_LIMIT_EVICT_INTERVAL_SECS));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    eviction.abort();
    Ok(())
}
