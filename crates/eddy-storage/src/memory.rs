//! In-memory storage backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use cid::multihash::{Code, MultihashDigest};
use cid::Cid;
use libipld::IpldCodec;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{BlockStore, Datastore};

/// In-memory content-addressed block store backed by a `RwLock<HashMap>`.
///
/// Clonable: clones share the same underlying map, so several stores in one
/// process can resolve each other's blocks. Useful for testing and for
/// single-process multi-store setups.
#[derive(Clone, Default)]
pub struct MemBlockStore {
    blocks: Arc<RwLock<HashMap<Cid, Bytes>>>,
}

impl MemBlockStore {
    /// Create a new empty block store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, codec: u64, data: Bytes) -> Cid {
        let cid = Cid::new_v1(codec, Code::Sha2_256.digest(&data));
        self.blocks
            .write()
            .expect("lock poisoned")
            .insert(cid, data);
        cid
    }

    fn fetch(&self, cid: &Cid) -> Result<Bytes, StorageError> {
        self.blocks
            .read()
            .expect("lock poisoned")
            .get(cid)
            .cloned()
            .ok_or(StorageError::BlockNotFound(*cid))
    }
}

#[async_trait::async_trait]
impl BlockStore for MemBlockStore {
    async fn put_block(&self, data: Bytes) -> Result<Cid, StorageError> {
        let cid = self.insert(IpldCodec::DagCbor.into(), data);
        debug!(%cid, "stored dag-cbor block");
        Ok(cid)
    }

    async fn get_block(&self, cid: &Cid) -> Result<Bytes, StorageError> {
        self.fetch(cid)
    }

    async fn add_file(&self, data: Bytes) -> Result<Cid, StorageError> {
        let cid = self.insert(IpldCodec::Raw.into(), data);
        debug!(%cid, "stored raw file");
        Ok(cid)
    }

    async fn get_file(&self, cid: &Cid) -> Result<Bytes, StorageError> {
        self.fetch(cid)
    }
}

/// In-memory key-value datastore.
///
/// Backs the head cache in tests and memory-only stores. `destroy` wipes the
/// map; both `close` and `destroy` leave the store rejecting further calls.
#[derive(Default)]
pub struct MemDatastore {
    entries: RwLock<HashMap<String, Bytes>>,
    closed: AtomicBool,
}

impl MemDatastore {
    /// Create a new empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Datastore for MemDatastore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        self.check_open()?;
        Ok(self.entries.read().expect("lock poisoned").get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
        self.check_open()?;
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_open()?;
        self.entries.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        self.entries.write().expect("lock poisoned").clear();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_block_put_get_roundtrip() {
        let store = MemBlockStore::new();
        let data = Bytes::from_static(b"\xa1\x61a\x01"); // {"a": 1} as cbor

        let cid = store.put_block(data.clone()).await.unwrap();
        assert_eq!(store.get_block(&cid).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_block_cid_is_deterministic() {
        let store = MemBlockStore::new();
        let data = Bytes::from_static(b"same bytes");

        let a = store.put_block(data.clone()).await.unwrap();
        let b = store.put_block(data).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1, "identical content is deduplicated");
    }

    #[tokio::test]
    async fn test_file_and_block_codecs_differ() {
        let store = MemBlockStore::new();
        let data = Bytes::from_static(b"same bytes");

        let block = store.put_block(data.clone()).await.unwrap();
        let file = store.add_file(data).await.unwrap();
        assert_ne!(block, file, "raw and dag-cbor CIDs must differ");
    }

    #[tokio::test]
    async fn test_missing_block_errors() {
        let store = MemBlockStore::new();
        let other = MemBlockStore::new();
        let cid = other
            .put_block(Bytes::from_static(b"elsewhere"))
            .await
            .unwrap();

        assert!(matches!(
            store.get_block(&cid).await,
            Err(StorageError::BlockNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_blocks() {
        let store = MemBlockStore::new();
        let clone = store.clone();

        let cid = store.put_block(Bytes::from_static(b"shared")).await.unwrap();
        assert!(clone.get_block(&cid).await.is_ok());
    }

    #[tokio::test]
    async fn test_datastore_roundtrip() {
        let ds = MemDatastore::new();
        ds.put("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(ds.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        ds.delete("k").await.unwrap();
        assert_eq!(ds.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_datastore_closed_rejects_ops() {
        let ds = MemDatastore::new();
        ds.close().await.unwrap();
        assert!(matches!(ds.get("k").await, Err(StorageError::Closed)));
        assert!(matches!(
            ds.put("k", Bytes::new()).await,
            Err(StorageError::Closed)
        ));
    }
}
