//! Gossip-backed pub/sub using iroh-gossip.
//!
//! Each log address maps to a gossip topic (blake3 of the topic name).
//! Head announcements are wrapped in a nonce-carrying envelope so that
//! PlumTree never deduplicates two distinct broadcasts that happen to have
//! identical payload bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_lite::StreamExt;
use iroh::protocol::Router;
use iroh::{Endpoint, NodeId};
use iroh_gossip::api::{Event, GossipSender};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use iroh_gossip::proto::TopicId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::PubSubError;
use crate::{PubSub, Subscription};

/// Maximum gossip message size.
const MAX_MESSAGE_SIZE: usize = 262_144;

/// Per-subscriber channel capacity.
const SUBSCRIBER_CAPACITY: usize = 256;

/// Wire envelope for gossip messages.
///
/// The random nonce guarantees byte-level uniqueness of repeated payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GossipMessage {
    nonce: u64,
    payload: Vec<u8>,
}

struct TopicHandle {
    sender: GossipSender,
    pump: tokio::task::JoinHandle<()>,
}

/// Pub/sub transport over an iroh-gossip swarm.
pub struct GossipPubSub {
    gossip: Gossip,
    router: Mutex<Option<Router>>,
    bootstrap: Vec<NodeId>,
    topics: Mutex<HashMap<String, TopicHandle>>,
    closed: AtomicBool,
}

impl GossipPubSub {
    /// Spawn the gossip protocol on an endpoint.
    ///
    /// `bootstrap` lists peers joined for every topic subscription.
    pub fn spawn(endpoint: Endpoint, bootstrap: Vec<NodeId>) -> Self {
        let gossip = Gossip::builder()
            .max_message_size(MAX_MESSAGE_SIZE)
            .spawn(endpoint.clone());

        let router = Router::builder(endpoint)
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        info!(peers = bootstrap.len(), "gossip pubsub started");

        Self {
            gossip,
            router: Mutex::new(Some(router)),
            bootstrap,
            topics: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn topic_id(topic: &str) -> TopicId {
        TopicId::from_bytes(*blake3::hash(topic.as_bytes()).as_bytes())
    }

    fn check_open(&self) -> Result<(), PubSubError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PubSubError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PubSub for GossipPubSub {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, PubSubError> {
        self.check_open()?;

        let topic_id = Self::topic_id(topic);
        let joined = self
            .gossip
            .subscribe_and_join(topic_id, self.bootstrap.clone())
            .await
            .map_err(|e| PubSubError::Gossip(e.to_string()))?;

        let (sender, mut receiver) = joined.split();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

        let topic_name = topic.to_string();
        let pump = tokio::spawn(async move {
            while let Some(event) = receiver.next().await {
                match event {
                    Ok(Event::Received(msg)) => {
                        match postcard::from_bytes::<GossipMessage>(&msg.content) {
                            Ok(envelope) => {
                                if tx.send(Bytes::from(envelope.payload)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(topic = %topic_name, "failed to decode gossip message: {e}");
                            }
                        }
                    }
                    Ok(Event::NeighborUp(id)) => {
                        debug!(topic = %topic_name, %id, "gossip neighbor up");
                    }
                    Ok(Event::NeighborDown(id)) => {
                        debug!(topic = %topic_name, %id, "gossip neighbor down");
                    }
                    Ok(Event::Lagged) => {
                        warn!(topic = %topic_name, "gossip receiver lagged, messages may be lost");
                    }
                    Err(e) => {
                        warn!(topic = %topic_name, "gossip receiver error: {e}");
                        break;
                    }
                }
            }
            debug!(topic = %topic_name, "gossip receive loop exited");
        });

        self.topics
            .lock()
            .await
            .insert(topic.to_string(), TopicHandle { sender, pump });

        debug!(topic, ?topic_id, "joined gossip topic");
        Ok(Subscription::new(rx))
    }

    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError> {
        self.check_open()?;

        let envelope = GossipMessage {
            nonce: rand::random(),
            payload: data.to_vec(),
        };
        let bytes =
            postcard::to_allocvec(&envelope).map_err(|e| PubSubError::Serialization(e.to_string()))?;

        // Hold the topics lock across the broadcast so a concurrent
        // unsubscribe cannot invalidate the checked handle.
        let topics = self.topics.lock().await;
        let handle = topics
            .get(topic)
            .ok_or_else(|| PubSubError::NotSubscribed(topic.to_string()))?;

        handle
            .sender
            .broadcast(Bytes::from(bytes))
            .await
            .map_err(|e| PubSubError::Gossip(e.to_string()))?;
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubError> {
        let handle = self
            .topics
            .lock()
            .await
            .remove(topic)
            .ok_or_else(|| PubSubError::NotSubscribed(topic.to_string()))?;

        handle.pump.abort();
        drop(handle.sender);
        debug!(topic, "left gossip topic");
        Ok(())
    }

    async fn close(&self) -> Result<(), PubSubError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut topics = self.topics.lock().await;
        for (_, handle) in topics.drain() {
            handle.pump.abort();
        }
        drop(topics);

        self.gossip
            .clone()
            .shutdown()
            .await
            .map_err(|e| PubSubError::Gossip(e.to_string()))?;
        if let Some(router) = self.router.lock().await.take() {
            router
                .shutdown()
                .await
                .map_err(|e| PubSubError::Gossip(e.to_string()))?;
        }
        info!("gossip pubsub shut down");
        Ok(())
    }
}
