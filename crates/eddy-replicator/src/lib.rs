//! Bounded-concurrency replication engine.
//!
//! The [`Replicator`] fetches the causal closure of announced head CIDs
//! from the object store, at most `concurrency` heads at a time, and
//! delivers completed sub-logs to its subscribers as [`ReplicatorEvent`]s.
//! The concurrency cap is the sole backpressure mechanism for remote
//! ingest: saturated loads enqueue and return immediately.

mod info;


pub use info::{ReplicationInfo, ReplicationStatus};

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use cid::Cid;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use eddy_access::{AccessController, SnapshotContext};
use eddy_log::{from_entry_hash, Entry, FetchOptions, Identity, IdentityProvider, Log};
use eddy_storage::BlockStore;

/// Event channel capacity. Progress events fire per fetched entry, so the
/// channel is sized generously.
const EVENT_CAPACITY: usize = 1024;

/// Events emitted by the replication engine, in fetch-completion order.
#[derive(Debug, Clone)]
pub enum ReplicatorEvent {
    /// A head CID was accepted into the fetch queue.
    LoadAdded {
        /// The queued head.
        hash: Cid,
    },
    /// An entry belonging to a head's closure was fetched.
    LoadProgress {
        /// The head whose closure is being fetched.
        hash: Cid,
        /// The entry just read.
        latest: Entry,
        /// Completed sub-logs currently buffered.
        buffer_length: usize,
    },
    /// One or more sub-logs completed and are ready to be joined.
    LoadEnd {
        /// The drained buffer of completed sub-logs.
        logs: Vec<Log>,
    },
}

/// The store-side view the replicator needs: which entries the main log
/// already holds. Implemented by a lightweight handle so the replicator
/// never keeps the whole store alive.
#[async_trait::async_trait]
pub trait ReplicationSource: Send + Sync {
    /// Whether the main log already contains this entry.
    async fn contains(&self, hash: &Cid) -> bool;

    /// Hashes of all entries the main log currently holds.
    async fn known_hashes(&self) -> HashSet<Cid>;

    /// Snapshot of the main log's entries, for access-control context.
    async fn log_entries(&self) -> Vec<Entry>;
}

struct SchedState {
    queue: VecDeque<Cid>,
    in_flight: HashSet<Cid>,
    buffered: Vec<Log>,
    tasks: JoinSet<()>,
    stopped: bool,
}

struct Inner {
    blocks: Arc<dyn BlockStore>,
    source: Arc<dyn ReplicationSource>,
    access: Arc<dyn AccessController>,
    provider: Arc<dyn IdentityProvider>,
    identity: Identity,
    log_id: String,
    concurrency: usize,
    state: Mutex<SchedState>,
    events: broadcast::Sender<ReplicatorEvent>,
}

/// Fetches the causal closure of announced heads with bounded concurrency.
#[derive(Clone)]
pub struct Replicator {
    inner: Arc<Inner>,
}

impl Replicator {
    /// Create a replicator for one log.
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        source: Arc<dyn ReplicationSource>,
        access: Arc<dyn AccessController>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        log_id: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                blocks,
                source,
                access,
                provider,
                identity,
                log_id: log_id.into(),
                concurrency: concurrency.max(1),
                state: Mutex::new(SchedState {
                    queue: VecDeque::new(),
                    in_flight: HashSet::new(),
                    buffered: Vec::new(),
                    tasks: JoinSet::new(),
                    stopped: false,
                }),
                events,
            }),
        }
    }

    /// Subscribe to replication events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReplicatorEvent> {
        self.inner.events.subscribe()
    }

    /// Enqueue head CIDs for fetching.
    ///
    /// CIDs already present in the main log, already queued, or already in
    /// flight are skipped. Returns immediately; fetching happens on
    /// background tasks.
    pub async fn load(&self, cids: Vec<Cid>) {
        if self.inner.state.lock().expect("lock poisoned").stopped {
            return;
        }

        for cid in cids {
            if self.inner.source.contains(&cid).await {
                continue;
            }

            let added = {
                let mut state = self.inner.state.lock().expect("lock poisoned");
                if state.stopped
                    || state.in_flight.contains(&cid)
                    || state.queue.contains(&cid)
                {
                    false
                } else {
                    state.queue.push_back(cid);
                    true
                }
            };

            if added {
                debug!(hash = %cid, "queued head for replication");
                let _ = self.inner.events.send(ReplicatorEvent::LoadAdded { hash: cid });
            }
        }

        self.pump();
    }

    /// Cancel all in-flight fetches and drain the queue.
    ///
    /// Already-completed sub-logs stay deliverable through
    /// [`buffer_len`](Self::buffer_len); subsequent `load` calls are no-ops.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        state.stopped = true;
        state.tasks.abort_all();
        state.queue.clear();
        state.in_flight.clear();
        debug!("replicator stopped");
    }

    /// CIDs currently queued or in flight.
    pub fn queue(&self) -> Vec<Cid> {
        let state = self.inner.state.lock().expect("lock poisoned");
        state
            .queue
            .iter()
            .chain(state.in_flight.iter())
            .copied()
            .collect()
    }

    /// Number of completed sub-logs awaiting delivery.
    pub fn buffer_len(&self) -> usize {
        self.inner.state.lock().expect("lock poisoned").buffered.len()
    }

    /// Launch fetches until the concurrency cap is reached.
    fn pump(&self) {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        if state.stopped {
            return;
        }

        // Reap finished tasks so the set doesn't accumulate results.
        while state.tasks.try_join_next().is_some() {}

        while state.in_flight.len() < self.inner.concurrency {
            let Some(cid) = state.queue.pop_front() else {
                break;
            };
            state.in_flight.insert(cid);

            let inner = self.inner.clone();
            state.tasks.spawn(async move {
                Replicator { inner: inner.clone() }.fetch_head(cid).await;
            });
        }
    }

    /// Fetch the closure of one head and buffer the resulting sub-log.
    async fn fetch_head(&self, head: Cid) {
        let exclude = self.inner.source.known_hashes().await;
        let context_entries = self.inner.source.log_entries().await;

        let inner = self.inner.clone();
        let context = SnapshotContext(context_entries);
        let filter = move |entry: &Entry| {
            match inner
                .access
                .can_append(entry, inner.provider.as_ref(), &context)
            {
                Ok(()) => true,
                Err(e) => {
                    debug!(hash = %entry.hash, "entry discarded during replication: {e}");
                    false
                }
            }
        };

        let inner = self.inner.clone();
        let progress = move |entry: &Entry| {
            let buffer_length = inner.state.lock().expect("lock poisoned").buffered.len();
            let _ = inner.events.send(ReplicatorEvent::LoadProgress {
                hash: head,
                latest: entry.clone(),
                buffer_length,
            });
        };

        let result = from_entry_hash(
            self.inner.blocks.as_ref(),
            self.inner.provider.as_ref(),
            &self.inner.log_id,
            self.inner.identity.clone(),
            &[head],
            FetchOptions {
                exclude: &exclude,
                length: -1,
                filter: Some(&filter),
                progress: Some(&progress),
            },
        )
        .await;

        match result {
            Ok(sub_log) => {
                let logs = {
                    let mut state = self.inner.state.lock().expect("lock poisoned");
                    state.in_flight.remove(&head);
                    if !sub_log.is_empty() {
                        state.buffered.push(sub_log);
                    }
                    if state.buffered.is_empty() {
                        Vec::new()
                    } else {
                        std::mem::take(&mut state.buffered)
                    }
                };

                if !logs.is_empty() {
                    debug!(hash = %head, logs = logs.len(), "head fetch complete");
                    let _ = self.inner.events.send(ReplicatorEvent::LoadEnd { logs });
                }
            }
            Err(e) => {
                self.inner
                    .state
                    .lock()
                    .expect("lock poisoned")
                    .in_flight
                    .remove(&head);
                warn!(hash = %head, "head fetch failed: {e}");
            }
        }

        self.pump();
    }
}
