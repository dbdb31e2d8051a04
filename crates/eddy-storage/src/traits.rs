//! Core traits for the storage collaborators.

use bytes::Bytes;
use cid::Cid;

use crate::error::StorageError;

/// Trait for a content-addressed object store.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Data is passed as [`Bytes`] to enable zero-copy transfers.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a dag-cbor block and return its CID.
    async fn put_block(&self, data: Bytes) -> Result<Cid, StorageError>;

    /// Retrieve a block by CID.
    async fn get_block(&self, cid: &Cid) -> Result<Bytes, StorageError>;

    /// Store an opaque byte stream (raw codec) and return its CID.
    async fn add_file(&self, data: Bytes) -> Result<Cid, StorageError>;

    /// Retrieve a byte stream previously stored with [`add_file`](Self::add_file).
    async fn get_file(&self, cid: &Cid) -> Result<Bytes, StorageError>;
}

/// Trait for the key-value datastore backing the head cache.
#[async_trait::async_trait]
pub trait Datastore: Send + Sync {
    /// Look up a key. Returns `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Store a value under a key, overwriting any previous value.
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Flush and close the datastore. Further operations fail with
    /// [`StorageError::Closed`].
    async fn close(&self) -> Result<(), StorageError>;

    /// Remove all stored data and close.
    async fn destroy(&self) -> Result<(), StorageError>;
}
