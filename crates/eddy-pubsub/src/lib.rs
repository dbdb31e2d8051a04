//! Topic-based pub/sub for head announcements.
//!
//! Stores publish their heads on a topic named after the log address and
//! ingest announcements from peers on the same topic. The transport is
//! consumed, not owned: [`PubSub`] is the interface, with an in-process
//! router ([`MemPubSub`]) for tests and single-process setups, and an
//! iroh-gossip transport ([`GossipPubSub`]) for real networks.

mod error;
mod gossip;
mod memory;

pub use error::PubSubError;
pub use gossip::GossipPubSub;
pub use memory::{MemPubSub, MemPubSubClient};

use bytes::Bytes;

/// A live subscription to one topic.
///
/// Messages arrive in delivery order with best-effort semantics.
pub struct Subscription {
    rx: tokio::sync::mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub(crate) fn new(rx: tokio::sync::mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Wait for the next message. Returns `None` once the topic is closed
    /// or unsubscribed.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Topic-based publish/subscribe transport.
///
/// A single client multiplexes subscriptions by topic name; publishing to a
/// topic without a local subscription is rejected.
#[async_trait::async_trait]
pub trait PubSub: Send + Sync {
    /// Subscribe to a topic, returning a stream of raw messages.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, PubSubError>;

    /// Broadcast a message to all subscribers of a topic.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError>;

    /// Tear down the local subscription for a topic.
    async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubError>;

    /// Close all subscriptions.
    async fn close(&self) -> Result<(), PubSubError>;
}
