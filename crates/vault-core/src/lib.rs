//! # vault-core
//!
//! Core types, traits, and abstractions for vault.
//!
//! This crate provides the domain model for taggable bookmarks and notes,
//! the tag normalization and association-diff primitives, and the trait
//! seams implemented by the relational store and the search index.

pub mod defaults;
pub mod error;
pub mod models;
pub mod tags;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use tags::{diff_tags, normalize_tag_name, normalize_tag_set, TagDiff};
pub use traits::*;
pub use uuid_utils::new_v7;
