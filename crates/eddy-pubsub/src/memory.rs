//! In-process pub/sub router.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::PubSubError;
use crate::{PubSub, Subscription};

/// Per-subscriber channel capacity.
const SUBSCRIBER_CAPACITY: usize = 256;

/// Shared in-process topic router.
///
/// Each participant obtains its own [`MemPubSubClient`]; clients sharing a
/// router deliver to each other. Messages to a topic go to every subscribed
/// client, including the publisher's own subscription.
#[derive(Clone, Default)]
pub struct MemPubSub {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    topics: Mutex<HashMap<String, Vec<(u64, mpsc::Sender<Bytes>)>>>,
    next_client_id: AtomicU64,
}

impl MemPubSub {
    /// Create a new router with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client attached to this router.
    pub fn client(&self) -> MemPubSubClient {
        MemPubSubClient {
            router: self.clone(),
            client_id: self.inner.next_client_id.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(ClientState {
                subscribed: HashSet::new(),
                closed: false,
            }),
        }
    }

    fn deliver(&self, topic: &str, data: &Bytes) {
        let mut topics = self.inner.topics.lock().expect("lock poisoned");
        if let Some(senders) = topics.get_mut(topic) {
            senders.retain(|(_, tx)| !tx.is_closed());
            for (_, tx) in senders.iter() {
                // Best-effort: a full subscriber buffer drops the message.
                let _ = tx.try_send(data.clone());
            }
        }
    }

    fn register(&self, client_id: u64, topic: &str, tx: mpsc::Sender<Bytes>) {
        self.inner
            .topics
            .lock()
            .expect("lock poisoned")
            .entry(topic.to_string())
            .or_default()
            .push((client_id, tx));
    }

    fn deregister(&self, client_id: u64, topic: Option<&str>) {
        let mut topics = self.inner.topics.lock().expect("lock poisoned");
        match topic {
            Some(topic) => {
                if let Some(senders) = topics.get_mut(topic) {
                    senders.retain(|(id, _)| *id != client_id);
                }
            }
            None => {
                for senders in topics.values_mut() {
                    senders.retain(|(id, _)| *id != client_id);
                }
            }
        }
    }
}

struct ClientState {
    subscribed: HashSet<String>,
    closed: bool,
}

/// One participant's handle on a [`MemPubSub`] router.
pub struct MemPubSubClient {
    router: MemPubSub,
    client_id: u64,
    state: Mutex<ClientState>,
}

#[async_trait::async_trait]
impl PubSub for MemPubSubClient {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, PubSubError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

        {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.closed {
                return Err(PubSubError::Closed);
            }
            state.subscribed.insert(topic.to_string());
        }

        self.router.register(self.client_id, topic, tx);
        debug!(topic, client = self.client_id, "subscribed");
        Ok(Subscription::new(rx))
    }

    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError> {
        // The subscription check and the delivery happen under the client
        // lock so an unsubscribe cannot slip in between.
        let state = self.state.lock().expect("lock poisoned");
        if state.closed {
            return Err(PubSubError::Closed);
        }
        if !state.subscribed.contains(topic) {
            return Err(PubSubError::NotSubscribed(topic.to_string()));
        }

        self.router.deliver(topic, &data);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubError> {
        let removed = {
            let mut state = self.state.lock().expect("lock poisoned");
            state.subscribed.remove(topic)
        };
        if !removed {
            return Err(PubSubError::NotSubscribed(topic.to_string()));
        }

        self.router.deregister(self.client_id, Some(topic));
        debug!(topic, client = self.client_id, "unsubscribed");
        Ok(())
    }

    async fn close(&self) -> Result<(), PubSubError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.subscribed.clear();
            state.closed = true;
        }
        self.router.deregister(self.client_id, None);
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
    async fn test_publish_reaches_other_client() {
        let router = MemPubSub::new();
        let a = router.client();
        let b = router.client();

        let _a_sub = a.subscribe("topic").await.unwrap();
        let mut b_sub = b.subscribe("topic").await.unwrap();

        a.publish("topic", Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(b_sub.next().await, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_publish_without_subscription_rejected() {
        let router = MemPubSub::new();
        let a = router.client();

        let result = a.publish("topic", Bytes::new()).await;
        assert!(matches!(result, Err(PubSubError::NotSubscribed(_))));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let router = MemPubSub::new();
        let a = router.client();
        let b = router.client();

        let _a_sub = a.subscribe("one").await.unwrap();
        let mut b_sub = b.subscribe("two").await.unwrap();

        a.publish("one", Bytes::from_static(b"x")).await.unwrap();

        tokio::select! {
            msg = b_sub.next() => panic!("unexpected cross-topic delivery: {msg:?}"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_stream() {
        let router = MemPubSub::new();
        let a = router.client();
        let mut sub = a.subscribe("topic").await.unwrap();

        a.unsubscribe("topic").await.unwrap();

        assert_eq!(sub.next().await, None, "stream closes after unsubscribe");
    }

    #[tokio::test]
    async fn test_unsubscribed_client_no_longer_receives() {
        let router = MemPubSub::new();
        let a = router.client();
        let b = router.client();

        let mut a_sub = a.subscribe("topic").await.unwrap();
        let _b_sub = b.subscribe("topic").await.unwrap();

        a.unsubscribe("topic").await.unwrap();
        b.publish("topic", Bytes::from_static(b"late")).await.unwrap();

        assert_eq!(a_sub.next().await, None);
    }

    #[tokio::test]
    async fn test_closed_client_rejects_everything() {
        let router = MemPubSub::new();
        let a = router.client();
        a.close().await.unwrap();

        assert!(matches!(a.subscribe("t").await, Err(PubSubError::Closed)));
        assert!(matches!(
            a.publish("t", Bytes::new()).await,
            Err(PubSubError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_publisher_receives_own_messages() {
        let router = MemPubSub::new();
        let a = router.client();

        let mut sub = a.subscribe("topic").await.unwrap();
        a.publish("topic", Bytes::from_static(b"self")).await.unwrap();

        assert_eq!(sub.next().await, Some(Bytes::from_static(b"self")));
    }
}
