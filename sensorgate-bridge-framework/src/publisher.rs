//! Telemetry publisher.

use sensorgate_common::{
    CONNECT_TOPIC, DISCONNECT_TOPIC, DeliveryLevel, TELEMETRY_TOPIC, TelemetryEnvelope,
    announce_payload, disconnect_payload, gateway_telemetry_payload,
};
use serde_json::Value;

use crate::sink::{MessageId, SinkError, TelemetrySink};

/// Publisher-side view of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of [`Publisher::reconnect_if_disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The sink still reported a live connection; nothing was attempted.
    AlreadyConnected,
    /// One reconnect attempt was made and succeeded.
    Reconnected,
    /// One reconnect attempt was made and failed.
    Failed,
}

/// Owns the telemetry sink and the connection state.
///
/// The publisher is the only component that connects, publishes or
/// reconnects; device code never sees the sink.
pub struct Publisher<S> {
    sink: S,
    state: ConnectionState,
    delivery: DeliveryLevel,
    stats: PublishStats,
}

impl<S: TelemetrySink> Publisher<S> {
    /// Create a new publisher around an unconnected sink.
    pub fn new(sink: S, delivery: DeliveryLevel) -> Self {
        Self {
            sink,
            state: ConnectionState::Disconnected,
            delivery,
            stats: PublishStats::default(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Counters since startup.
    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// Get a reference to the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Whether the sink reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// Open the connection.
    pub async fn connect(&mut self) -> Result<(), SinkError> {
        self.state = ConnectionState::Connecting;
        match self.sink.connect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Announce a device on the gateway connect topic.
    pub async fn announce(&mut self, device_name: &str) -> Result<MessageId, SinkError> {
        let id = self
            .publish_json(CONNECT_TOPIC, &announce_payload(device_name))
            .await?;
        tracing::info!(device = %device_name, message_id = id, "Published device connect message");
        Ok(id)
    }

    /// Publish one envelope in the gateway telemetry form.
    pub async fn publish_envelope(
        &mut self,
        envelope: &TelemetryEnvelope,
    ) -> Result<MessageId, SinkError> {
        let payload = gateway_telemetry_payload(std::slice::from_ref(envelope));
        self.publish_json(TELEMETRY_TOPIC, &payload).await
    }

    /// Attempt exactly one reconnect, and only if the sink reports the
    /// connection as down.
    pub async fn reconnect_if_disconnected(&mut self) -> ReconnectOutcome {
        if self.sink.is_connected() {
            self.state = ConnectionState::Connected;
            return ReconnectOutcome::AlreadyConnected;
        }

        self.state = ConnectionState::Connecting;
        self.stats.reconnects += 1;
        tracing::info!("Attempting to reconnect to gateway");

        match self.sink.reconnect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                tracing::info!("Reconnected to gateway");
                ReconnectOutcome::Reconnected
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                tracing::error!(error = %e, "Gateway reconnect failed");
                ReconnectOutcome::Failed
            }
        }
    }

    /// Best-effort shutdown: tell the gateway each device is gone, then
    /// close the connection.
    pub async fn shutdown<'a, I>(&mut self, device_names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.sink.is_connected() {
            for name in device_names {
                if let Err(e) = self
                    .publish_json(DISCONNECT_TOPIC, &disconnect_payload(name))
                    .await
                {
                    tracing::warn!(device = %name, error = %e, "Failed to publish device disconnect");
                }
            }
        }

        if let Err(e) = self.sink.disconnect().await {
            tracing::warn!(error = %e, "Error closing gateway connection");
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn publish_json(&mut self, topic: &str, payload: &Value) -> Result<MessageId, SinkError> {
        match self.sink.publish(topic, payload, self.delivery).await {
            Ok(id) => {
                self.stats.success += 1;
                self.state = ConnectionState::Connected;
                tracing::debug!(topic = %topic, message_id = id, "Message queued");
                Ok(id)
            }
            Err(e) => {
                self.stats.failed += 1;
                self.state = if self.sink.is_connected() {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                };
                Err(e)
            }
        }
    }
}

/// Publish counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully queued messages.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
    /// Number of reconnect attempts.
    pub reconnects: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.success as f64 / self.total() as f64) * 100.0
        }
    }
}
