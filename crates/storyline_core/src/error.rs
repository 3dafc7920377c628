//! Error types for Storyline core.

use storyline_protocol::ProtocolError;
use storyline_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Storyline core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Story content fails validation.
    #[error("validation error: {0}")]
    Validation(#[from] ProtocolError),

    /// A stored document cannot be decoded into its model type.
    #[error("corrupt document {collection}/{id}: {message}")]
    CorruptDocument {
        /// Collection name.
        collection: String,
        /// Document ID.
        id: String,
        /// Decoder message.
        message: String,
    },

    /// The addressed story does not exist.
    #[error("story not found: {0}")]
    StoryNotFound(String),
}

impl CoreError {
    /// Creates a corrupt document error.
    pub fn corrupt_document(
        collection: impl Into<String>,
        id: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::CorruptDocument {
            collection: collection.into(),
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Store(e) if e.is_retryable())
    }

    /// Returns true if the store could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CoreError::Store(StoreError::Unavailable(_)))
    }
}
