use super::traits::{BusMessage, BusSubscription, MessageBus, Result};
use crate::foundation::SkusError;
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, Mutex};

const TOPIC_CAPACITY: usize = 256;

/// In-process broker for tests and local runs. Every published message is also retained per
/// topic so tests can inspect what was sent without racing a subscriber.
pub struct MemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<BusMessage>>>,
    log: Mutex<HashMap<String, Vec<BusMessage>>>,
    publish_failure: parking_lot::Mutex<Option<String>>,
    offset: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            log: Mutex::new(HashMap::new()),
            publish_failure: parking_lot::Mutex::new(None),
            offset: AtomicU64::new(0),
        }
    }

    async fn topic(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        let mut guard = self.topics.lock().await;
        guard.entry(topic.to_string()).or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0).clone()
    }

    /// Every publish fails with `details` until cleared with `None`.
    pub fn set_publish_failure(&self, details: Option<&str>) {
        *self.publish_failure.lock() = details.map(str::to_string);
    }

    pub async fn published(&self, topic: &str) -> Vec<BusMessage> {
        self.log.lock().await.get(topic).cloned().unwrap_or_default()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(details) = self.publish_failure.lock().clone() {
            return Err(SkusError::bus("publish", details));
        }
        let message = BusMessage {
            topic: topic.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
            offset: self.offset.fetch_add(1, Ordering::Relaxed),
        };
        debug!("memory bus publish topic={} offset={} size={}", topic, message.offset, message.value.len());
        self.log.lock().await.entry(topic.to_string()).or_default().push(message.clone());
        let sender = self.topic(topic).await;
        // No subscribers is not an error for a broker.
        let _ = sender.send(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusSubscription> {
        let sender = self.topic(topic).await;
        let mut receiver = sender.subscribe();
        let topic = topic.to_string();
        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(message) => yield Ok(message),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("memory bus subscriber lagged topic={} skipped={}", topic, skipped);
                        yield Err(SkusError::bus("subscribe", format!("lagged by {skipped} messages")));
                    }
                }
            }
        };
        Ok(BusSubscription::new(Box::pin(stream)))
    }
}
