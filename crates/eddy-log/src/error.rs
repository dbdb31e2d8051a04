//! Error types for the log crate.

use cid::Cid;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Entry signature verification failed.
    #[error("invalid entry signature")]
    InvalidSignature,

    /// A public key could not be parsed.
    #[error("invalid public key")]
    InvalidKey,

    /// The identity passed for signing does not match the signer's key.
    #[error("identity does not match signing key")]
    IdentityMismatch,

    /// An entry's declared hash does not match its canonical encoding.
    #[error("entry hash mismatch: declared {declared}, computed {computed}")]
    TamperedEntry {
        /// Hash carried by the entry.
        declared: Cid,
        /// Hash recomputed from the canonical encoding.
        computed: Cid,
    },

    /// Two logs with different identifiers cannot be joined.
    #[error("log id mismatch: {ours:?} vs {theirs:?}")]
    LogIdMismatch {
        /// Identifier of the local log.
        ours: String,
        /// Identifier of the other log.
        theirs: String,
    },

    /// Canonical encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Object-store failure while fetching or writing entries.
    #[error("storage error: {0}")]
    Storage(#[from] eddy_storage::StorageError),
}

impl LogError {
    pub(crate) fn encoding(e: impl std::fmt::Display) -> Self {
        Self::Encoding(e.to_string())
    }
}
