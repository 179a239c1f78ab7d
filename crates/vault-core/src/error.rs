//! Error types for vault.

use thiserror::Error;

/// Result type alias using vault's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Record or tag not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// (owner, natural key) collision
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Missing required filter, malformed tag set, bad field values
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Search index operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification exposed to the API layer.
///
/// Everything that is not one of the named conditions is `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Internal,
}

impl Error {
    /// Classify this error for response mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Database(_)
            | Error::Search(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Internal(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether this is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
