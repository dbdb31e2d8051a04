//! Fjall-backed datastore for durable head persistence.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};

use crate::error::StorageError;
use crate::traits::Datastore;

/// Durable key-value datastore backed by fjall.
///
/// One keyspace holds the handful of head-cache keys; values are opaque
/// bytes supplied by the caller.
pub struct FjallDatastore {
    #[allow(dead_code)]
    db: Database,
    entries: Keyspace,
    closed: AtomicBool,
}

impl FjallDatastore {
    /// Open a persistent datastore at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::builder(path)
            .open()
            .map_err(StorageError::backend)?;
        Self::init(db)
    }

    /// Open a temporary datastore (cleaned up on drop).
    pub fn open_temporary() -> Result<Self, StorageError> {
        let tmp = tempfile::tempdir()?;
        let db = Database::builder(tmp.path())
            .temporary(true)
            .open()
            .map_err(StorageError::backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StorageError> {
        let entries = db
            .keyspace("cache", KeyspaceCreateOptions::default)
            .map_err(StorageError::backend)?;
        Ok(Self {
            db,
            entries,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Datastore for FjallDatastore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        self.check_open()?;
        Ok(self
            .entries
            .get(key.as_bytes())
            .map_err(StorageError::backend)?
            .map(|v| Bytes::from(v.to_vec())))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
        self.check_open()?;
        self.entries
            .insert(key.as_bytes(), value.as_ref())
            .map_err(StorageError::backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_open()?;
        self.entries
            .remove(key.as_bytes())
            .map_err(StorageError::backend)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        for key in ["_localHeads", "_remoteHeads", "snapshot", "queue"] {
            self.entries
                .remove(key.as_bytes())
                .map_err(StorageError::backend)?;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
