//! Message channel abstraction and the embedding worker pool.
//!
//! This crate provides:
//! - [`MessageChannel`] — the publish/subscribe contract the pipeline core
//!   consumes; correlation of requests to results is the caller's concern
//! - [`InProcessChannel`] — a process-local topic registry backed by
//!   `tokio::sync::broadcast`, created once at startup and shared by reference
//! - [`worker::EmbedWorkerPool`] — the worker fleet consuming embed requests
//!   and publishing one result per unit

pub mod protocol;
pub mod worker;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use askdocs_shared::{AskDocsError, Result};

pub use protocol::{EmbedRequest, EmbedResult, EmbedUnit};
pub use worker::EmbedWorkerPool;

// ---------------------------------------------------------------------------
// MessageChannel
// ---------------------------------------------------------------------------

/// Publish/subscribe channel connecting the pipeline to the worker fleet.
///
/// The channel offers no request/response semantics: subscribers see every
/// payload on a topic, and demultiplexing inbound results belongs to the
/// consumer (keyed by correlation id). Publishing succeeds whether or not
/// anyone is currently subscribed.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish one payload on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Open an infinite, non-restartable stream of payloads on `topic`.
    ///
    /// Only payloads published after the subscription exists are delivered.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// An open subscription to one topic.
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<Vec<u8>>,
}

impl Subscription {
    /// Receive the next payload.
    ///
    /// A slow consumer that falls behind the topic buffer skips the dropped
    /// payloads and keeps reading; the gap is logged.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscription lagged, payloads dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(AskDocsError::Channel(format!(
                        "topic '{}' closed",
                        self.topic
                    )));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InProcessChannel
// ---------------------------------------------------------------------------

/// Process-local [`MessageChannel`] backed by one broadcast queue per topic.
pub struct InProcessChannel {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InProcessChannel {
    /// Create a channel whose topics buffer up to `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().expect("topic registry poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl MessageChannel for InProcessChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let sender = self.sender_for(topic);
        // A send error only means nobody is subscribed right now; the payload
        // is dropped, matching broker semantics for an unconsumed topic.
        if sender.send(payload).is_err() {
            debug!(topic, "published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let sender = self.sender_for(topic);
        Ok(Subscription {
            topic: topic.to_string(),
            rx: sender.subscribe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let channel = InProcessChannel::new(8);
        let mut sub = channel.subscribe("t").await.expect("subscribe");

        channel.publish("t", b"hello".to_vec()).await.expect("publish");
        assert_eq!(sub.recv().await.expect("recv"), b"hello".to_vec());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let channel = InProcessChannel::new(8);
        let mut sub_a = channel.subscribe("a").await.unwrap();
        let mut sub_b = channel.subscribe("b").await.unwrap();

        channel.publish("a", b"for-a".to_vec()).await.unwrap();
        channel.publish("b", b"for-b".to_vec()).await.unwrap();

        assert_eq!(sub_a.recv().await.unwrap(), b"for-a".to_vec());
        assert_eq!(sub_b.recv().await.unwrap(), b"for-b".to_vec());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let channel = InProcessChannel::new(8);
        channel
            .publish("nobody-listening", b"dropped".to_vec())
            .await
            .expect("publish succeeds with no subscribers");
    }

    #[tokio::test]
    async fn subscription_only_sees_later_payloads() {
        let channel = InProcessChannel::new(8);
        channel.publish("t", b"early".to_vec()).await.unwrap();

        let mut sub = channel.subscribe("t").await.unwrap();
        channel.publish("t", b"late".to_vec()).await.unwrap();

        assert_eq!(sub.recv().await.unwrap(), b"late".to_vec());
    }

    #[tokio::test]
    async fn all_subscribers_see_every_payload() {
        let channel = InProcessChannel::new(8);
        let mut first = channel.subscribe("t").await.unwrap();
        let mut second = channel.subscribe("t").await.unwrap();

        channel.publish("t", b"fanout".to_vec()).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), b"fanout".to_vec());
        assert_eq!(second.recv().await.unwrap(), b"fanout".to_vec());
    }
}
