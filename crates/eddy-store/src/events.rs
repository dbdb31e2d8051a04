//! Lifecycle events emitted by the store.
//!
//! Events from a single store are totally ordered and dispatched in the
//! order of the triggering mutation. Handlers must not block the emitter.

use cid::Cid;

use eddy_log::Entry;
use eddy_replicator::ReplicationStatus;
use eddy_types::events::Event;
use eddy_types::Address;

/// Reconstruction from the head cache has begun.
#[derive(Clone, Debug)]
pub struct LoadEvent {
    /// Store address.
    pub address: Address,
    /// Heads the reconstruction starts from.
    pub heads: Vec<Entry>,
}
impl Event for LoadEvent {}

/// Reconstruction is complete; the store is ready.
#[derive(Clone, Debug)]
pub struct ReadyEvent {
    /// Store address.
    pub address: Address,
    /// Current heads after reconstruction.
    pub heads: Vec<Entry>,
}
impl Event for ReadyEvent {}

/// A local append was committed.
#[derive(Clone, Debug)]
pub struct WriteEvent {
    /// Store address.
    pub address: Address,
    /// The appended entry.
    pub entry: Entry,
    /// Heads after the append.
    pub heads: Vec<Entry>,
}
impl Event for WriteEvent {}

/// A remote head was observed. Reserved.
#[derive(Clone, Debug)]
pub struct ReplicateEvent {
    /// Store address.
    pub address: Address,
    /// The observed head.
    pub hash: Cid,
}
impl Event for ReplicateEvent {}

/// An entry belonging to a remote head's closure was fetched.
#[derive(Clone, Debug)]
pub struct ReplicateProgressEvent {
    /// Store address.
    pub address: Address,
    /// The head being fetched.
    pub hash: Cid,
    /// The entry just read.
    pub entry: Entry,
    /// Counter snapshot at emission time.
    pub status: ReplicationStatus,
}
impl Event for ReplicateProgressEvent {}

/// A batch of replicated sub-logs was joined into the log.
#[derive(Clone, Debug)]
pub struct ReplicatedEvent {
    /// Store address.
    pub address: Address,
    /// Number of sub-logs joined.
    pub count: usize,
}
impl Event for ReplicatedEvent {}

/// The store has shut down.
#[derive(Clone, Debug)]
pub struct ClosedEvent {
    /// Store address.
    pub address: Address,
}
impl Event for ClosedEvent {}
