//! Error types for SyncKit
//!
//! Follows the error taxonomy described in the sync design: Transport,
//! Auth, Oversize, Storage, and Logic errors each map to a distinct
//! variant so callers can apply the right recovery policy (retry
//! invisibly vs. surface to the embedding application).

use thiserror::Error;

/// Result type alias for SyncKit operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for SyncKit operations
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("conflict error: {0}")]
    ConflictError(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("malformed protocol frame: {0}")]
    Protocol(String),

    #[error("value exceeds size limit: {field} is {actual} bytes, limit is {limit} bytes")]
    Oversize {
        field: String,
        actual: usize,
        limit: usize,
    },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl SyncError {
    /// Check if this error is retryable (spec.md §7: recoverable categories
    /// are retried invisibly, never surfaced as write failures).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkError(_) | SyncError::StorageError(_) | SyncError::ConflictError(_)
        )
    }

    /// Error code for wire `error` frames and client-visible events.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            SyncError::FieldNotFound(_) => "FIELD_NOT_FOUND",
            SyncError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            SyncError::SerializationError(_) => "SERIALIZATION_ERROR",
            SyncError::DeserializationError(_) => "DESERIALIZATION_ERROR",
            SyncError::StorageError(_) => "STORAGE_ERROR",
            SyncError::NetworkError(_) => "NETWORK_ERROR",
            SyncError::ConflictError(_) => "CONFLICT_ERROR",
            SyncError::InvalidOperation(_) => "INVALID_OPERATION",
            SyncError::Protocol(_) => "INTERNAL",
            SyncError::Oversize { .. } => "OVERSIZE",
            SyncError::AuthFailed(_) => "AUTH_FAILED",
            SyncError::RateLimited(_) => "RATE_LIMITED",
        }
    }
}
