//! Error types for the storage ports and the detection pipeline.

use thiserror::Error;

/// Failure reported by one of the durable ports (asset catalog, facts cache,
/// result snapshot).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Unrecoverable failure of a `detect` call.
///
/// Per-asset problems never surface here; they are logged and the asset is
/// skipped for the tier in question.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to read asset metadata: {0}")]
    Setup(#[source] StoreError),
}
