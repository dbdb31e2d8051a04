//! Typed broadcast of lifecycle events.
//!
//! Components publish concrete event structs and interested parties pull a
//! stream per event type. The bus erases types internally so event structs
//! can live next to their emitters instead of in one central enum; a
//! subscription only ever sees the type it asked for.
//!
//! Emission is strictly non-blocking. Each subscriber owns a bounded
//! backlog; a handler that falls behind loses the oldest events, and its
//! receiver keeps count of how many were dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::warn;

/// Marker for types that can travel through the [`EventBus`].
///
/// Implementors are plain data: cloned once per subscriber on emission.
pub trait Event: Any + Send + Sync + Clone + std::fmt::Debug + 'static {}

/// How many undelivered events each subscriber may accumulate before the
/// oldest are discarded. One store mutation emits one event, so this bounds
/// the per-subscriber backlog of mutations, not a global buffer.
const DEFAULT_BACKLOG: usize = 128;

/// Broadcast hub for lifecycle events.
///
/// Cheap to clone; clones share the same channels. One channel exists per
/// event type, opened by the first subscriber for that type.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
    backlog: usize,
}

impl EventBus {
    /// A bus with the default subscriber backlog.
    pub fn new() -> Self {
        Self::with_backlog(DEFAULT_BACKLOG)
    }

    /// A bus whose subscribers may lag by at most `backlog` events.
    pub fn with_backlog(backlog: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            backlog: backlog.max(1),
        }
    }

    /// Publish an event to the current subscribers of its type.
    ///
    /// Never blocks. With no subscription open for the type, the event is
    /// discarded.
    pub fn emit<E: Event>(&self, event: E) {
        let channels = self.channels.read().expect("event bus lock poisoned");
        if let Some(entry) = channels.get(&TypeId::of::<E>())
            && let Some(sender) = entry.downcast_ref::<broadcast::Sender<E>>()
        {
            // send errs only when no receiver is alive; same as no channel.
            let _ = sender.send(event);
        }
    }

    /// Open a stream of events of type `E`.
    ///
    /// Only events emitted after this call are delivered.
    pub fn subscribe<E: Event>(&self) -> EventReceiver<E> {
        let mut channels = self.channels.write().expect("event bus lock poisoned");
        let entry = channels
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::new(broadcast::channel::<E>(self.backlog).0));
        let sender = entry
            .downcast_ref::<broadcast::Sender<E>>()
            .expect("event channel registered under wrong type");

        EventReceiver {
            rx: sender.subscribe(),
            skipped: 0,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("backlog", &self.backlog)
            .finish_non_exhaustive()
    }
}

/// Receiving end of one event type.
pub struct EventReceiver<E: Event> {
    rx: broadcast::Receiver<E>,
    skipped: u64,
}

impl<E: Event> EventReceiver<E> {
    /// Next event, in emission order.
    ///
    /// Returns `None` once the bus is gone. When the subscriber fell behind
    /// its backlog, the lost events are added to [`skipped`](Self::skipped)
    /// and the stream resumes at the oldest retained event.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.skipped += n;
                    warn!(
                        dropped = n,
                        event = std::any::type_name::<E>(),
                        "subscriber fell behind, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain one already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.skipped += n,
                Err(_) => return None,
            }
        }
    }

    /// Events lost to backlog overflow since subscribing.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
