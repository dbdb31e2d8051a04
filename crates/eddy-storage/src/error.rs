//! Error types for storage operations.

use cid::Cid;

/// Errors that can occur during block-store or datastore operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    BlockNotFound(Cid),

    /// The requested datastore key was not found.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The datastore has been closed.
    #[error("datastore is closed")]
    Closed,

    /// Storage backend error.
    #[error("storage error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }
}
