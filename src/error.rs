//! Error types for the document history.

use crate::types::VersionId;
use thiserror::Error;

/// Main error type for history operations.
///
/// "Not found" and "no change" are not errors: lookups return `Option` and
/// saves return [`SaveOutcome`](crate::types::SaveOutcome).
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Diff codec error: {0}")]
    Codec(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Version record missing: {0}")]
    MissingRecord(VersionId),

    #[error("Invalid version identifier: {0:?}")]
    InvalidVersion(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Persistence store fault: {0}")]
    Store(String),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Serialization(e.to_string())
    }
}

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
