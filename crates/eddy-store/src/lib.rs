//! The base store: a replicated, eventually consistent append-only log.
//!
//! [`BaseStore`] orchestrates the pieces: local appends go into the log DAG
//! and are announced over pub/sub; remote announcements are verified by the
//! access controller, fetched by the replicator, and joined back into the
//! log; heads are persisted in the head cache; snapshots serialize the full
//! entry set into one object-store file.

mod cache;
mod error;
mod events;
mod index;
mod snapshot;
mod store;

#[cfg(test)]
mod tests;

pub use cache::{HeadCache, LOCAL_HEADS_KEY, QUEUE_KEY, REMOTE_HEADS_KEY, SNAPSHOT_KEY};
pub use error::StoreError;
pub use events::{
    ClosedEvent, LoadEvent, ReadyEvent, ReplicateEvent, ReplicateProgressEvent, ReplicatedEvent,
    WriteEvent,
};
pub use index::{BaseIndex, Index};
pub use snapshot::{decode_snapshot, encode_snapshot, SnapshotHeader};
pub use store::{BaseStore, STORE_TYPE};
