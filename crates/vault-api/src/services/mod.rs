//! Service layer over the relational store and the search index.

pub mod rate_limiter;
pub mod record_service;

pub use rate_limiter::{RateDecision, RequestLimiter};
pub use record_service::{IndexSync, PropagationMode, RebuildReport, RecordService, Synced};
