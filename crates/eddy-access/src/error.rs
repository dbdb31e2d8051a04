//! Error types for access control.

/// Errors that can occur during access-control operations.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The entry's author holds no write capability.
    #[error("unauthorized: identity {id} cannot append")]
    Unauthorized {
        /// Identity id of the rejected author.
        id: String,
    },

    /// No constructor registered for the requested controller type.
    #[error("unrecognized access controller type {0:?}")]
    UnknownType(String),

    /// The manifest block could not be decoded.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Object-store failure while reading or writing a manifest.
    #[error("storage error: {0}")]
    Storage(#[from] eddy_storage::StorageError),
}
