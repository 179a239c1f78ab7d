//! Tracing subscriber initialization.
//!
//! Every event carries `subsystem` ("db", "search", "service") and
//! `component`; record events add `op`, `record_kind` and `record_id`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Startup work failed |
//! | WARN  | Index propagation failed after the record committed |
//! | INFO  | Lifecycle events (pool open, index opened, rebuild finished) |
//! | DEBUG | Decision points (tag diff sizes, propagation mode) |

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vault_core::{Error, Result};

use crate::config::{LogConfig, LogFormat};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "vault_api=debug,vault_db=info,vault_search=info";

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process when logging to
/// a file; dropping it flushes and stops the background writer.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let init_err = |e: tracing_subscriber::util::TryInitError| {
        Error::Config(format!("failed to install tracing subscriber: {e}"))
    };

    let guard = if let Some(path) = &config.file {
        let dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("vault-api.log");
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        match config.format {
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .try_init()
                .map_err(init_err)?,
            LogFormat::Text => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(config.ansi.unwrap_or(false)),
                )
                .try_init()
                .map_err(init_err)?,
        }
        Some(guard)
    } else {
        match config.format {
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(init_err)?,
            LogFormat::Text => {
                let mut layer = tracing_subscriber::fmt::layer();
                if let Some(ansi) = config.ansi {
                    layer = layer.with_ansi(ansi);
                }
                registry.with(layer).try_init().map_err(init_err)?
            }
        }
        None
    };

    tracing::info!(
        subsystem = "config",
        log_format = ?config.format,
        log_file = config
            .file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(stdout)".into()),
        "Logging initialized"
    );
    Ok(guard)
}
