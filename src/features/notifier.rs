// Change notifications
// Broadcasts "config changed" events so other workers reload their state

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// A single published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub topic: String,
    pub guild_id: u64,
    pub payload: Option<Vec<u8>>,
}

/// Publish/subscribe transport. Delivery is at most once.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn publish(&self, topic: &str, guild_id: u64, payload: Option<Vec<u8>>) -> anyhow::Result<()>;
}

/// In-process bus on top of a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusEvent>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn publish(&self, topic: &str, guild_id: u64, payload: Option<Vec<u8>>) -> anyhow::Result<()> {
        let event = BusEvent {
            topic: topic.to_string(),
            guild_id,
            payload,
        };
        // No subscribers is not a failure: nobody needed the event
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            debug!(topic = %event.topic, guild_id, "Dropped event, no subscribers");
        }
        Ok(())
    }
}

pub struct ChangeNotifier {
    bus: Arc<dyn BroadcastBus>,
}

impl ChangeNotifier {
    pub fn new(bus: Arc<dyn BroadcastBus>) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, topic: &str, guild_id: u64, payload: Option<Vec<u8>>) -> Result<()> {
        self.bus
            .publish(topic, guild_id, payload)
            .await
            .map_err(ConfigError::propagation)
    }
}
