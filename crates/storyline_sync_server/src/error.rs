//! Error types for the sync server.

use storyline_core::CoreError;
use storyline_protocol::{ErrorResponse, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request is malformed, incomplete or over a size limit.
    #[error("invalid request: {0}")]
    Validation(#[from] ProtocolError),

    /// The message type is not handled by the server.
    #[error("unexpected message type: {0}")]
    UnexpectedMessage(u8),

    /// The document store cannot be reached. Retry later.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        if err.is_retryable() {
            return ServerError::StoreUnavailable(err.to_string());
        }
        match err {
            CoreError::Validation(e) => ServerError::Validation(e),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Validation(_) | ServerError::UnexpectedMessage(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::StoreUnavailable(_) | ServerError::Internal(_)
        )
    }

    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::StoreUnavailable(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Validation(ProtocolError::BatchTooLarge { .. }) => "BATCH_TOO_LARGE",
            ServerError::Validation(_) => "VALIDATION_ERROR",
            ServerError::UnexpectedMessage(_) => "UNEXPECTED_MESSAGE",
            ServerError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Builds the error body sent to the client.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}
