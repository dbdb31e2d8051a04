//! Error types for the store.

use cid::Cid;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store was opened without a usable identity.
    #[error("identity required")]
    IdentityRequired,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// A synced head's block landed in the object store under a different
    /// hash than it declared. Aborts the whole sync batch.
    #[error("head hash mismatch: declared {declared}, stored {stored}")]
    HeadHashMismatch {
        /// Hash the head claimed.
        declared: Cid,
        /// Hash the object store computed.
        stored: Cid,
    },

    /// No snapshot pointer in the head cache.
    #[error("snapshot not found")]
    SnapshotNotFound,

    /// The snapshot stream could not be parsed.
    #[error("snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    /// Access controller failure.
    #[error(transparent)]
    Access(#[from] eddy_access::AccessError),

    /// Log DAG failure.
    #[error(transparent)]
    Log(#[from] eddy_log::LogError),

    /// Block-store or datastore failure.
    #[error(transparent)]
    Storage(#[from] eddy_storage::StorageError),

    /// Pub/sub transport failure.
    #[error(transparent)]
    PubSub(#[from] eddy_pubsub::PubSubError),

    /// JSON serialization failure for cached heads or snapshot frames.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
