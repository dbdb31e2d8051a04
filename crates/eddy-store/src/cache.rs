//! Head cache: durable local and remote head sets.
//!
//! A thin wrapper over the external key-value datastore. The contract: on
//! clean shutdown, `_localHeads ∪ _remoteHeads` equals the current heads of
//! the log. Values are canonical JSON arrays.

use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use tracing::debug;

use eddy_log::Entry;
use eddy_storage::Datastore;

use crate::error::StoreError;

/// Heads produced by local appends.
pub const LOCAL_HEADS_KEY: &str = "_localHeads";
/// Heads adopted from successful replications.
pub const REMOTE_HEADS_KEY: &str = "_remoteHeads";
/// CID of the last saved snapshot file.
pub const SNAPSHOT_KEY: &str = "snapshot";
/// CIDs still in flight at snapshot time.
pub const QUEUE_KEY: &str = "queue";

/// Durable head-tracking cache over a [`Datastore`].
#[derive(Clone)]
pub struct HeadCache {
    store: Arc<dyn Datastore>,
}

impl HeadCache {
    /// Wrap a datastore.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Heads written by the last local append. Absent key reads as empty.
    pub async fn local_heads(&self) -> Result<Vec<Entry>, StoreError> {
        self.read_heads(LOCAL_HEADS_KEY).await
    }

    /// Overwrite the local head set.
    pub async fn set_local_heads(&self, heads: &[Entry]) -> Result<(), StoreError> {
        self.write_heads(LOCAL_HEADS_KEY, heads).await
    }

    /// Heads adopted from replication. Absent key reads as empty.
    pub async fn remote_heads(&self) -> Result<Vec<Entry>, StoreError> {
        self.read_heads(REMOTE_HEADS_KEY).await
    }

    /// Overwrite the remote head set.
    pub async fn set_remote_heads(&self, heads: &[Entry]) -> Result<(), StoreError> {
        self.write_heads(REMOTE_HEADS_KEY, heads).await
    }

    /// CID of the last saved snapshot, if any.
    pub async fn snapshot_cid(&self) -> Result<Option<Cid>, StoreError> {
        let Some(bytes) = self.store.get(SNAPSHOT_KEY).await? else {
            return Ok(None);
        };
        let s = String::from_utf8_lossy(&bytes);
        let cid = Cid::try_from(s.as_ref())
            .map_err(|e| StoreError::SnapshotCorrupt(format!("bad snapshot cid: {e}")))?;
        Ok(Some(cid))
    }

    /// Record the snapshot pointer.
    pub async fn set_snapshot_cid(&self, cid: &Cid) -> Result<(), StoreError> {
        self.store
            .put(SNAPSHOT_KEY, Bytes::from(cid.to_string()))
            .await?;
        Ok(())
    }

    /// CIDs that were still in flight when the snapshot was saved.
    /// `None` when no queue was ever recorded.
    pub async fn queue(&self) -> Result<Option<Vec<Cid>>, StoreError> {
        let Some(bytes) = self.store.get(QUEUE_KEY).await? else {
            return Ok(None);
        };
        let strings: Vec<String> = serde_json::from_slice(&bytes)?;
        let cids = strings
            .iter()
            .map(|s| Cid::try_from(s.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::SnapshotCorrupt(format!("bad queued cid: {e}")))?;
        Ok(Some(cids))
    }

    /// Record the in-flight queue.
    pub async fn set_queue(&self, cids: &[Cid]) -> Result<(), StoreError> {
        let strings: Vec<String> = cids.iter().map(Cid::to_string).collect();
        self.store
            .put(QUEUE_KEY, Bytes::from(serde_json::to_vec(&strings)?))
            .await?;
        Ok(())
    }

    /// Remove the cached head sets, keeping snapshot pointers.
    ///
    /// Snapshots are additive; their pointers survive a store drop.
    pub async fn destroy_heads(&self) -> Result<(), StoreError> {
        self.store.delete(LOCAL_HEADS_KEY).await?;
        self.store.delete(REMOTE_HEADS_KEY).await?;
        debug!("destroyed cached head sets");
        Ok(())
    }

    /// Close the underlying datastore.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await?;
        Ok(())
    }

    async fn read_heads(&self, key: &str) -> Result<Vec<Entry>, StoreError> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_heads(&self, key: &str, heads: &[Entry]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(heads)?;
        self.store.put(key, Bytes::from(bytes)).await?;
        debug!(key, count = heads.len(), "persisted heads");
        Ok(())
    }
}
