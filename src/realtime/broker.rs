use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::realtime::transport::{Transport, TransportError};

/// Buffered deliveries per subscriber before it starts lagging
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// In-process broker: delivers to whoever is subscribed at trigger time.
///
/// Nothing is retained for later subscribers. A channel with no live
/// subscriber simply drops the event.
#[derive(Default)]
pub struct LocalBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<Delivery>>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Delivery> {
        let mut channels = self.channels.lock();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for LocalBroker {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn trigger(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError> {
        let mut channels = self.channels.lock();

        let Some(tx) = channels.get(channel) else {
            return Ok(());
        };

        let delivery = Delivery {
            channel: channel.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };

        if tx.send(delivery).is_err() {
            // Every subscriber went away.
            channels.remove(channel);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_to_all_subscribers() {
        let broker = LocalBroker::new();
        let mut first = broker.subscribe("project:1");
        let mut second = broker.subscribe("project:1");

        broker
            .trigger("project:1", "task:created", &serde_json::json!({"id": 1}))
            .await
            .unwrap();

        assert_eq!(first.recv().await.unwrap().event, "task:created");
        assert_eq!(second.recv().await.unwrap().payload["id"], 1);
    }

    #[tokio::test]
    async fn test_other_channels_are_not_delivered() {
        let broker = LocalBroker::new();
        let mut task_rx = broker.subscribe("task:1");

        broker
            .trigger("project:1", "task:created", &Value::Null)
            .await
            .unwrap();

        assert!(task_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let broker = LocalBroker::new();
        let rx = broker.subscribe("user:1");
        assert_eq!(broker.subscriber_count("user:1"), 1);
        drop(rx);

        broker
            .trigger("user:1", "notification:created", &Value::Null)
            .await
            .unwrap();
        assert_eq!(broker.subscriber_count("user:1"), 0);
    }
}
