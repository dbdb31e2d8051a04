//! Error types for the pub/sub transports.

/// Errors that can occur during pub/sub operations.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Publishing requires a local subscription to the topic.
    #[error("not subscribed to this topic: {0}")]
    NotSubscribed(String),

    /// The transport has been closed.
    #[error("pubsub transport is closed")]
    Closed,

    /// Gossip layer failure.
    #[error("gossip error: {0}")]
    Gossip(String),

    /// Message envelope could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}
