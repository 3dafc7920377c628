//! Error types for protocol decoding and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or validating protocol data.
///
/// Every variant is a client-side fault: the request is rejected as a whole
/// and nothing is partially processed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The body is not valid JSON or does not match the message shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The message type code is not known.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// A required field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The client sent more checksums than accepted.
    #[error("too many story checksums: {actual}, limit is {max}")]
    TooManyChecksums {
        /// Accepted maximum.
        max: usize,
        /// Entries supplied.
        actual: usize,
    },

    /// An asset batch carried no paths.
    #[error("asset batch is empty")]
    EmptyBatch,

    /// An asset batch carried more paths than accepted.
    #[error("asset batch too large: {actual} paths, limit is {max}")]
    BatchTooLarge {
        /// Accepted maximum.
        max: usize,
        /// Paths supplied.
        actual: usize,
    },

    /// A story document fails structural validation.
    #[error("invalid story {id:?}: {reason}")]
    InvalidStory {
        /// Story ID (may be empty).
        id: String,
        /// What is wrong.
        reason: String,
    },
}

impl ProtocolError {
    /// Creates an invalid story error.
    pub fn invalid_story(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStory {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
