//! # vault-api
//!
//! Service layer for vault: the record services that keep the search index
//! in step with committed writes, the [`Vault`] container, environment
//! configuration, tracing setup and per-client request limiting.

pub mod config;
pub mod logging;
pub mod services;
pub mod vault;

pub use config::{LogConfig, LogFormat, RateLimitConfig, VaultConfig};
pub use services::{
    IndexSync, PropagationMode, RateDecision, RebuildReport, RecordService, RequestLimiter, Synced,
};
pub use vault::Vault;
