//! Error types for document store operations.

use std::io;
use thiserror::Error;

/// Result type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document addressed by an update does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Document ID.
        id: String,
    },

    /// The document is not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The collection name cannot be used.
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    /// The query is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// An "in" filter carries more values than the store accepts.
    #[error("'in' query too large: {actual} values, limit is {max}")]
    InQueryTooLarge {
        /// Maximum values per "in" filter.
        max: usize,
        /// Values supplied.
        actual: usize,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// A collection file on disk is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}
