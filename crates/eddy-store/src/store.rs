//! [`BaseStore`] — orchestrates the log, replicator, head cache and events.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use cid::Cid;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use eddy_access::{AccessController, SimpleAccessController, SnapshotContext};
use eddy_log::{from_entry_hash, Entry, FetchOptions, Identity, IdentityProvider, Log};
use eddy_pubsub::PubSub;
use eddy_replicator::{
    ReplicationInfo, ReplicationSource, ReplicationStatus, Replicator, ReplicatorEvent,
};
use eddy_storage::{BlockStore, Datastore};
use eddy_types::events::EventBus;
use eddy_types::{Address, StoreOptions};

use crate::cache::HeadCache;
use crate::error::StoreError;
use crate::events::{
    ClosedEvent, LoadEvent, ReadyEvent, ReplicateProgressEvent, ReplicatedEvent, WriteEvent,
};
use crate::index::{BaseIndex, Index};
use crate::snapshot::{decode_snapshot, encode_snapshot, SnapshotHeader};

/// Store type tag recorded in snapshots.
pub const STORE_TYPE: &str = "store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Ready,
    Loading,
    Closed,
}

/// Lightweight view of the op-log handed to the replicator, so that the
/// replicator never keeps the whole store alive.
struct LogHandle(Arc<RwLock<Log>>);

#[async_trait::async_trait]
impl ReplicationSource for LogHandle {
    async fn contains(&self, hash: &Cid) -> bool {
        self.0.read().await.contains(hash)
    }

    async fn known_hashes(&self) -> HashSet<Cid> {
        self.0.read().await.entry_hashes()
    }

    async fn log_entries(&self) -> Vec<Entry> {
        self.0.read().await.values()
    }
}

/// A replicated append-only log store.
///
/// Local writes append signed entries referencing their causal
/// predecessors; replicas converge by exchanging head announcements over
/// pub/sub and fetching missing ancestors from the object store.
pub struct BaseStore {
    address: Address,
    id: String,
    identity: Identity,
    provider: Arc<dyn IdentityProvider>,
    blocks: Arc<dyn BlockStore>,
    cache: HeadCache,
    access: Arc<dyn AccessController>,
    oplog: Arc<RwLock<Log>>,
    replicator: Replicator,
    status: Arc<ReplicationInfo>,
    index: Mutex<Box<dyn Index>>,
    events: EventBus,
    pubsub: Option<Arc<dyn PubSub>>,
    options: StoreOptions,
    state: Mutex<Lifecycle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    sync_requests_received: AtomicUsize,
}

impl BaseStore {
    /// Open a store at an address.
    ///
    /// Without an explicit access controller, a `simple` allow-list
    /// admitting only the local identity is installed. With `replicate` on
    /// and a pub/sub transport present, the store subscribes to its address
    /// topic and starts ingesting head announcements immediately.
    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        blocks: Arc<dyn BlockStore>,
        datastore: Arc<dyn Datastore>,
        pubsub: Option<Arc<dyn PubSub>>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        address: Address,
        access: Option<Arc<dyn AccessController>>,
        options: StoreOptions,
    ) -> Result<Arc<Self>, StoreError> {
        if identity.id.is_empty() || identity.pub_key.is_empty() {
            return Err(StoreError::IdentityRequired);
        }

        let id = address.to_string();
        let access = access.unwrap_or_else(|| {
            Arc::new(SimpleAccessController::new(vec![identity.id.clone()]))
                as Arc<dyn AccessController>
        });

        let oplog = Arc::new(RwLock::new(Log::new(&id, identity.clone())));
        let replicator = Replicator::new(
            blocks.clone(),
            Arc::new(LogHandle(oplog.clone())),
            access.clone(),
            provider.clone(),
            identity.clone(),
            &id,
            options.replication_concurrency,
        );

        let store = Arc::new(Self {
            address,
            id: id.clone(),
            identity,
            provider,
            blocks,
            cache: HeadCache::new(datastore),
            access,
            oplog,
            replicator,
            status: Arc::new(ReplicationInfo::new()),
            index: Mutex::new(Box::new(BaseIndex::new())),
            events: EventBus::new(),
            pubsub,
            options,
            state: Mutex::new(Lifecycle::Ready),
            tasks: Mutex::new(Vec::new()),
            sync_requests_received: AtomicUsize::new(0),
        });

        store.spawn_replicator_pump();
        if store.options.replicate {
            store.spawn_announcement_listener().await?;
        }

        info!(address = %store.id, "store opened");
        Ok(store)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The store's address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The local signer identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The access controller guarding this log.
    pub fn access_controller(&self) -> &Arc<dyn AccessController> {
        &self.access
    }

    /// The event bus for lifecycle events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Snapshot of the replication counters.
    pub fn replication_status(&self) -> ReplicationStatus {
        self.status.snapshot()
    }

    /// Number of sync batches received so far.
    pub fn sync_requests_received(&self) -> usize {
        self.sync_requests_received.load(Ordering::Relaxed)
    }

    /// Number of entries in the log.
    pub async fn len(&self) -> usize {
        self.oplog.read().await.len()
    }

    /// Whether the log holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.oplog.read().await.is_empty()
    }

    /// Current heads of the log.
    pub async fn heads(&self) -> Vec<Entry> {
        self.oplog.read().await.heads()
    }

    /// Ordered entries. A non-negative `amount` keeps only the newest
    /// `amount` entries; `-1` returns everything.
    pub async fn list(&self, amount: i64) -> Vec<Entry> {
        let values = self.oplog.read().await.values();
        if amount < 0 || values.len() <= amount as usize {
            values
        } else {
            values[values.len() - amount as usize..].to_vec()
        }
    }

    // ------------------------------------------------------------------
    // Append
    // ------------------------------------------------------------------

    /// Append a payload to the log.
    ///
    /// The entry is admission-checked, committed, written to the object
    /// store, persisted as the sole local head, and announced to peers.
    pub async fn append(&self, payload: Vec<u8>) -> Result<Entry, StoreError> {
        self.check_ready()?;

        let (entry, heads) = {
            let mut log = self.oplog.write().await;
            let entry = log.draft(
                self.provider.as_ref(),
                payload,
                self.options.reference_count,
            )?;
            let context = SnapshotContext(log.values());
            self.access
                .can_append(&entry, self.provider.as_ref(), &context)?;
            log.apply(entry.clone());
            (entry, log.heads())
        };

        let block = entry.to_block()?;
        let stored = self.blocks.put_block(block).await?;
        if stored != entry.hash {
            return Err(StoreError::HeadHashMismatch {
                declared: entry.hash,
                stored,
            });
        }

        self.recalculate_progress(self.status.progress() + 1).await;
        self.recalculate_max(entry.clock.time as usize).await;

        self.cache.set_local_heads(std::slice::from_ref(&entry)).await?;
        self.update_index().await;

        self.events.emit(WriteEvent {
            address: self.address.clone(),
            entry: entry.clone(),
            heads: heads.clone(),
        });

        if self.options.replicate
            && let Some(pubsub) = &self.pubsub
        {
            let announcement = serde_json::to_vec(&heads)?;
            if let Err(e) = pubsub.publish(&self.id, Bytes::from(announcement)).await {
                warn!(address = %self.id, "failed to announce heads: {e}");
            }
        }

        debug!(address = %self.id, hash = %entry.hash, "append complete");
        Ok(entry)
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Ingest externally announced head entries.
    ///
    /// Each candidate is admission-checked and integrity-checked; rejects
    /// are logged and skipped, never failing the batch. Accepted heads are
    /// written back to the object store and handed to the replicator. The
    /// only fatal case is a head whose block lands under a different hash
    /// than it declared.
    pub async fn sync(&self, heads: Vec<Entry>) -> Result<(), StoreError> {
        self.check_ready()?;
        self.sync_requests_received.fetch_add(1, Ordering::Relaxed);

        if heads.is_empty() {
            return Ok(());
        }

        let context = SnapshotContext(self.oplog.read().await.values());
        let mut accepted = Vec::new();

        for head in heads {
            if let Err(e) = self
                .access
                .can_append(&head, self.provider.as_ref(), &context)
            {
                debug!(
                    hash = %head.hash,
                    "sync candidate discarded (no write access): {e}"
                );
                continue;
            }

            let computed = match head.compute_hash() {
                Ok(cid) => cid,
                Err(e) => {
                    warn!(hash = %head.hash, "sync candidate not encodable: {e}");
                    continue;
                }
            };
            if computed != head.hash {
                warn!(
                    declared = %head.hash,
                    %computed,
                    "sync candidate rejected as tampered"
                );
                continue;
            }

            let stored = self.blocks.put_block(head.to_block()?).await?;
            if stored != head.hash {
                return Err(StoreError::HeadHashMismatch {
                    declared: head.hash,
                    stored,
                });
            }

            accepted.push(head.hash);
        }

        self.replicator.load(accepted).await;
        Ok(())
    }

    /// Queue additional CIDs for replication, bypassing head verification.
    pub async fn load_more_from(&self, cids: Vec<Cid>) {
        self.replicator.load(cids).await;
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Reconstruct the log from the cached heads.
    ///
    /// `amount` caps how much history is fetched per head; `-1` (all)
    /// falls back to the configured max history, when set.
    pub async fn load(&self, amount: i64) -> Result<(), StoreError> {
        self.set_state(Lifecycle::Loading)?;
        let result = self.load_inner(amount).await;
        // Ready again even on failure: the store keeps the state built from
        // the heads that loaded before the failing one.
        let _ = self.set_state(Lifecycle::Ready);
        result
    }

    async fn load_inner(&self, amount: i64) -> Result<(), StoreError> {
        let amount = if amount < 0 {
            self.options.max_history.map(|h| h as i64).unwrap_or(-1)
        } else {
            amount
        };

        let local = self.cache.local_heads().await?;
        let remote = self.cache.remote_heads().await?;

        let mut heads = local;
        let known: HashSet<Cid> = heads.iter().map(|e| e.hash).collect();
        heads.extend(remote.into_iter().filter(|e| !known.contains(&e.hash)));

        if !heads.is_empty() {
            self.events.emit(LoadEvent {
                address: self.address.clone(),
                heads: heads.clone(),
            });
        }

        for head in &heads {
            self.recalculate_max(head.clock.time as usize).await;

            let exclude = self.oplog.read().await.entry_hashes();
            let context = SnapshotContext(self.oplog.read().await.values());
            let access = self.access.clone();
            let provider = self.provider.clone();
            let filter = move |entry: &Entry| {
                access.can_append(entry, provider.as_ref(), &context).is_ok()
            };

            let sub_log = from_entry_hash(
                self.blocks.as_ref(),
                self.provider.as_ref(),
                &self.id,
                self.identity.clone(),
                &[head.hash],
                FetchOptions {
                    exclude: &exclude,
                    length: amount,
                    filter: Some(&filter),
                    progress: None,
                },
            )
            .await?;

            self.oplog.write().await.join(&sub_log, amount)?;
        }

        if !heads.is_empty() {
            self.update_index().await;
        }

        self.events.emit(ReadyEvent {
            address: self.address.clone(),
            heads: self.oplog.read().await.heads(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Serialize the full log into one object-store file.
    ///
    /// Persists the snapshot CID and the currently in-flight replication
    /// queue into the head cache.
    pub async fn save_snapshot(&self) -> Result<Cid, StoreError> {
        let unfinished = self.replicator.queue();

        let (header, values) = {
            let log = self.oplog.read().await;
            (
                SnapshotHeader {
                    id: log.id().to_string(),
                    heads: log.heads(),
                    size: log.len(),
                    store_type: STORE_TYPE.to_string(),
                },
                log.values(),
            )
        };

        let bytes = encode_snapshot(&header, &values)?;
        let cid = self.blocks.add_file(Bytes::from(bytes)).await?;

        self.cache.set_snapshot_cid(&cid).await?;
        self.cache.set_queue(&unfinished).await?;

        debug!(
            address = %self.id,
            snapshot = %cid,
            queued = unfinished.len(),
            "saved snapshot"
        );
        Ok(cid)
    }

    /// Restore the log from the last saved snapshot.
    ///
    /// An absent replication queue is benign; an absent snapshot pointer is
    /// an error. Queued CIDs resume through the replicator.
    pub async fn load_from_snapshot(&self) -> Result<(), StoreError> {
        if let Some(queued) = self.cache.queue().await? {
            self.replicator.load(queued).await;
        }

        let cid = self
            .cache
            .snapshot_cid()
            .await?
            .ok_or(StoreError::SnapshotNotFound)?;

        let bytes = self.blocks.get_file(&cid).await?;
        let (header, entries) = decode_snapshot(&bytes)?;

        if !header.heads.is_empty() {
            self.events.emit(LoadEvent {
                address: self.address.clone(),
                heads: header.heads.clone(),
            });
        }

        let max_clock = entries.iter().map(|e| e.clock.time).max().unwrap_or(0);
        self.recalculate_max(max_clock as usize).await;

        let head_cids: Vec<Cid> = header.heads.iter().map(|h| h.hash).collect();
        let sub_log = Log::from_entries(
            header.id,
            self.identity.clone(),
            entries,
            Some(head_cids),
        );

        self.oplog.write().await.join(&sub_log, -1)?;
        self.update_index().await;

        debug!(address = %self.id, snapshot = %cid, "loaded snapshot");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Shut the store down.
    ///
    /// Stops the replicator, resets counters, tears down subscriptions and
    /// closes the head cache. All steps are attempted; the first error is
    /// returned. Idempotent.
    pub async fn close(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state == Lifecycle::Closed {
                return Ok(());
            }
            *state = Lifecycle::Closed;
        }

        let mut first_error: Option<StoreError> = None;

        self.teardown(&mut first_error).await;

        if let Err(e) = self.cache.close().await
            && first_error.is_none()
        {
            first_error = Some(e);
        }

        info!(address = %self.id, "store closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Discard all local state for this log.
    ///
    /// The cached head sets are destroyed and an empty log is reinstated at
    /// the same id. Snapshot pointers survive (snapshots are additive), and
    /// the address remains valid — the store returns to `Ready` with an
    /// empty log.
    pub async fn drop_store(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state == Lifecycle::Closed {
                return Err(StoreError::Closed);
            }
            *state = Lifecycle::Closed;
        }

        let mut first_error: Option<StoreError> = None;
        self.teardown(&mut first_error).await;

        if let Err(e) = self.cache.destroy_heads().await
            && first_error.is_none()
        {
            first_error = Some(e);
        }

        {
            let mut log = self.oplog.write().await;
            *log = Log::new(&self.id, self.identity.clone());
        }
        {
            let mut index = self.index.lock().expect("lock poisoned");
            *index = Box::new(BaseIndex::new());
        }

        *self.state.lock().expect("lock poisoned") = Lifecycle::Ready;

        info!(address = %self.id, "store dropped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Common close/drop teardown: replicator, counters, tasks, topic.
    async fn teardown(&self, first_error: &mut Option<StoreError>) {
        self.replicator.stop();
        self.status.reset();
        self.sync_requests_received.store(0, Ordering::Relaxed);

        for task in self.tasks.lock().expect("lock poisoned").drain(..) {
            task.abort();
        }

        if self.options.replicate
            && let Some(pubsub) = &self.pubsub
            && let Err(e) = pubsub.unsubscribe(&self.id).await
        {
            // Already-gone subscriptions are expected on repeated teardowns.
            debug!(address = %self.id, "unsubscribe during teardown: {e}");
            if !matches!(e, eddy_pubsub::PubSubError::NotSubscribed(_)) && first_error.is_none() {
                *first_error = Some(StoreError::PubSub(e));
            }
        }

        self.events.emit(ClosedEvent {
            address: self.address.clone(),
        });
    }

    // ------------------------------------------------------------------
    // Replicator events
    // ------------------------------------------------------------------

    fn spawn_replicator_pump(self: &Arc<Self>) {
        let mut rx = self.replicator.subscribe();
        let weak = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(store) = weak.upgrade() else { break };
                        store.on_replicator_event(event).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "replicator event pump lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.tasks.lock().expect("lock poisoned").push(task);
    }

    async fn on_replicator_event(&self, event: ReplicatorEvent) {
        match event {
            ReplicatorEvent::LoadAdded { .. } => {
                self.status.inc_queued();
            }
            ReplicatorEvent::LoadProgress {
                hash,
                latest,
                buffer_length,
            } => {
                if self.status.buffered() > buffer_length {
                    self.recalculate_progress(self.status.progress() + buffer_length)
                        .await;
                } else {
                    let log_len = self.oplog.read().await.len();
                    self.recalculate_progress(log_len + buffer_length).await;
                }
                self.status.set_buffered(buffer_length);
                self.recalculate_max(self.status.progress()).await;

                self.events.emit(ReplicateProgressEvent {
                    address: self.address.clone(),
                    hash,
                    entry: latest,
                    status: self.status.snapshot(),
                });
            }
            ReplicatorEvent::LoadEnd { logs } => {
                self.on_replication_complete(logs).await;
            }
        }
    }

    async fn on_replication_complete(&self, logs: Vec<Log>) {
        debug!(address = %self.id, count = logs.len(), "replication load complete");

        {
            let mut log = self.oplog.write().await;
            for sub_log in &logs {
                if let Err(e) = log.join(sub_log, -1) {
                    error!(address = %self.id, "unable to join replicated log: {e}");
                    return;
                }
            }
        }

        self.status.decrease_queued(logs.len());
        self.status.set_buffered(self.replicator.buffer_len());
        self.update_index().await;

        let heads = self.oplog.read().await.heads();
        if let Err(e) = self.cache.set_remote_heads(&heads).await {
            error!(address = %self.id, "unable to persist remote heads: {e}");
            return;
        }
        debug!(address = %self.id, heads = heads.len(), "saved remote heads");

        self.events.emit(ReplicatedEvent {
            address: self.address.clone(),
            count: logs.len(),
        });
    }

    // ------------------------------------------------------------------
    // Announcement listener
    // ------------------------------------------------------------------

    async fn spawn_announcement_listener(self: &Arc<Self>) -> Result<(), StoreError> {
        let Some(pubsub) = &self.pubsub else {
            return Ok(());
        };

        let mut subscription = pubsub.subscribe(&self.id).await?;
        let weak = Arc::downgrade(self);
        let topic = self.id.clone();

        let task = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let Some(store) = weak.upgrade() else { break };

                match serde_json::from_slice::<Vec<Entry>>(&message) {
                    Ok(heads) => {
                        if let Err(e) = store.sync(heads).await {
                            warn!(%topic, "failed to sync announced heads: {e}");
                        }
                    }
                    Err(e) => {
                        warn!(%topic, "undecodable head announcement: {e}");
                    }
                }
            }
            debug!(%topic, "announcement listener exited");
        });

        self.tasks.lock().expect("lock poisoned").push(task);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Counters and index
    // ------------------------------------------------------------------

    async fn recalculate_progress(&self, target: usize) {
        let log_len = self.oplog.read().await.len();
        if self.status.progress() < log_len {
            self.status.set_progress(log_len);
        } else if self.status.progress() < target {
            self.status.set_progress(target);
        }
        self.recalculate_max(self.status.progress()).await;
    }

    async fn recalculate_max(&self, target: usize) {
        let log_len = self.oplog.read().await.len();
        if self.status.max() < log_len {
            self.status.set_max(log_len);
        } else if self.status.max() < target {
            self.status.set_max(target);
        }
    }

    async fn update_index(&self) {
        self.recalculate_max(0).await;
        {
            let log = self.oplog.read().await;
            self.index
                .lock()
                .expect("lock poisoned")
                .update_index(&log);
        }
        self.recalculate_progress(0).await;
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn check_ready(&self) -> Result<(), StoreError> {
        match *self.state.lock().expect("lock poisoned") {
            Lifecycle::Ready => Ok(()),
            _ => Err(StoreError::Closed),
        }
    }

    fn set_state(&self, next: Lifecycle) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if *state == Lifecycle::Closed {
            return Err(StoreError::Closed);
        }
        *state = next;
        Ok(())
    }
}
