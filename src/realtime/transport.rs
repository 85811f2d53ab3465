use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery to '{channel}' timed out")]
    TimedOut { channel: String },

    #[error("Broker rejected event on '{channel}': {reason}")]
    Rejected { channel: String, reason: String },
}

/// External pub/sub broker.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn trigger(&self, channel: &str, event: &str, payload: &Value)
    -> Result<(), TransportError>;
}

/// Writes every event to the log instead of a broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn trigger(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError> {
        info!(channel, event, payload = %payload, "Realtime event");
        Ok(())
    }
}
