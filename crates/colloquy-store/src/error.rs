//! Error types for the colloquy-store crate.
//!
//! All store operations return [`StoreError`] via [`StoreResult`].  At the
//! action boundary a `StoreError` becomes a
//! [`RuntimeError::Collaborator`](colloquy_kernel::RuntimeError::Collaborator)
//! and ends the conversation that hit it.

use std::path::PathBuf;

use colloquy_kernel::RuntimeError;
use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a memory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Keys must be non-empty.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

impl From<StoreError> for RuntimeError {
    fn from(err: StoreError) -> Self {
        RuntimeError::Collaborator {
            collaborator: "memory",
            reason: err.to_string(),
        }
    }
}
