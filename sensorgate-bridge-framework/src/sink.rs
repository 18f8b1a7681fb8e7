//! Telemetry sink abstraction.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::DeliveryLevel;

/// Identifier the sink assigns to each accepted publish.
pub type MessageId = u64;

/// Errors reported by a telemetry sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Connecting or reconnecting to the gateway failed.
    #[error("Failed to connect to {broker}: {message}")]
    Connect { broker: String, message: String },

    /// The sink refused or failed to queue a message.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// A publish was attempted without a live connection.
    #[error("Not connected to the gateway")]
    NotConnected,
}

/// A publish/subscribe client the bridge hands telemetry to.
///
/// Delivery confirmation, when the transport has one, happens behind this
/// trait: `publish` returns once the message is queued, not when it is
/// acknowledged.
#[async_trait]
pub trait TelemetrySink: Send {
    /// Open the connection.
    async fn connect(&mut self) -> Result<(), SinkError>;

    /// Queue a JSON payload on a topic.
    async fn publish(
        &mut self,
        topic: &str,
        payload: &Value,
        delivery: DeliveryLevel,
    ) -> Result<MessageId, SinkError>;

    /// Whether the connection is currently up.
    fn is_connected(&self) -> bool;

    /// Re-establish a lost connection. One attempt per call.
    async fn reconnect(&mut self) -> Result<(), SinkError>;

    /// Close the connection.
    async fn disconnect(&mut self) -> Result<(), SinkError>;
}
