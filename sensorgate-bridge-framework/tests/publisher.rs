//! Publisher behaviour against a scripted in-memory sink.

use async_trait::async_trait;
use sensorgate_bridge_framework::{
    ConnectionState, DeliveryLevel, MessageId, Publisher, ReconnectOutcome, SinkError,
    TelemetryEnvelope, TelemetrySink,
};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect,
    Publish(String),
    Reconnect,
    Disconnect,
}

#[derive(Default)]
struct ScriptedSink {
    calls: Vec<Call>,
    published: Vec<(String, Value, DeliveryLevel)>,
    connected: bool,
    refuse_connect: bool,
    refuse_reconnect: bool,
}

#[async_trait]
impl TelemetrySink for ScriptedSink {
    async fn connect(&mut self) -> Result<(), SinkError> {
        self.calls.push(Call::Connect);
        if self.refuse_connect {
            return Err(SinkError::Connect {
                broker: "localhost:1883".to_string(),
                message: "refused".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &Value,
        delivery: DeliveryLevel,
    ) -> Result<MessageId, SinkError> {
        self.calls.push(Call::Publish(topic.to_string()));
        if !self.connected {
            return Err(SinkError::NotConnected);
        }
        self.published
            .push((topic.to_string(), payload.clone(), delivery));
        Ok(self.published.len() as MessageId)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn reconnect(&mut self) -> Result<(), SinkError> {
        self.calls.push(Call::Reconnect);
        if self.refuse_reconnect {
            return Err(SinkError::Connect {
                broker: "localhost:1883".to_string(),
                message: "refused".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SinkError> {
        self.calls.push(Call::Disconnect);
        self.connected = false;
        Ok(())
    }
}

#[tokio::test]
async fn test_connect_transitions_state() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtLeastOnce);
    assert_eq!(publisher.state(), ConnectionState::Disconnected);

    publisher.connect().await.unwrap();
    assert_eq!(publisher.state(), ConnectionState::Connected);
    assert!(publisher.is_connected());
}

#[tokio::test]
async fn test_failed_connect_leaves_disconnected() {
    let sink = ScriptedSink {
        refuse_connect: true,
        ..Default::default()
    };
    let mut publisher = Publisher::new(sink, DeliveryLevel::AtLeastOnce);

    assert!(matches!(
        publisher.connect().await,
        Err(SinkError::Connect { .. })
    ));
    assert_eq!(publisher.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_announce_uses_connect_topic() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtLeastOnce);
    publisher.connect().await.unwrap();

    publisher.announce("ISM303DAC Magnetometer").await.unwrap();

    let (topic, payload, delivery) = &publisher.sink().published[0];
    assert_eq!(topic, "v1/gateway/connect");
    assert_eq!(payload["device"], "ISM303DAC Magnetometer");
    assert_eq!(*delivery, DeliveryLevel::AtLeastOnce);
}

#[tokio::test]
async fn test_envelope_published_in_gateway_form() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtMostOnce);
    publisher.connect().await.unwrap();

    let envelope = TelemetryEnvelope::new("SHT45 Trinkey Sensor", "default")
        .with_field("temperature", 24.5)
        .with_field("humidity", 55.1);
    publisher.publish_envelope(&envelope).await.unwrap();

    let (topic, payload, delivery) = &publisher.sink().published[0];
    assert_eq!(topic, "v1/gateway/telemetry");
    assert_eq!(*delivery, DeliveryLevel::AtMostOnce);
    assert_eq!(payload["SHT45 Trinkey Sensor"][0]["temperature"], 24.5);
    assert_eq!(publisher.stats().success, 1);
}

#[tokio::test]
async fn test_publish_failure_marks_disconnected() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtLeastOnce);

    let envelope = TelemetryEnvelope::new("dev", "default").with_field("x", 1.0);
    let result = publisher.publish_envelope(&envelope).await;

    assert_eq!(result, Err(SinkError::NotConnected));
    assert_eq!(publisher.state(), ConnectionState::Disconnected);
    assert_eq!(publisher.stats().failed, 1);
}

#[tokio::test]
async fn test_reconnect_skipped_when_connected() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtLeastOnce);
    publisher.connect().await.unwrap();

    let outcome = publisher.reconnect_if_disconnected().await;

    assert_eq!(outcome, ReconnectOutcome::AlreadyConnected);
    assert!(!publisher.sink().calls.contains(&Call::Reconnect));
    assert_eq!(publisher.stats().reconnects, 0);
}

#[tokio::test]
async fn test_reconnect_attempted_once_when_disconnected() {
    let sink = ScriptedSink {
        refuse_reconnect: true,
        ..Default::default()
    };
    let mut publisher = Publisher::new(sink, DeliveryLevel::AtLeastOnce);

    let outcome = publisher.reconnect_if_disconnected().await;

    assert_eq!(outcome, ReconnectOutcome::Failed);
    assert_eq!(publisher.state(), ConnectionState::Disconnected);
    let reconnects = publisher
        .sink()
        .calls
        .iter()
        .filter(|c| **c == Call::Reconnect)
        .count();
    assert_eq!(reconnects, 1);
}

#[tokio::test]
async fn test_shutdown_sends_device_disconnects() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtLeastOnce);
    publisher.connect().await.unwrap();

    publisher.shutdown(["mag", "acc"]).await;

    let sink = publisher.sink();
    let topics: Vec<&str> = sink.published.iter().map(|(t, _, _)| t.as_str()).collect();
    assert_eq!(topics, vec!["v1/gateway/disconnect", "v1/gateway/disconnect"]);
    assert_eq!(sink.published[1].1["device"], "acc");
    assert_eq!(sink.calls.last(), Some(&Call::Disconnect));
    assert_eq!(publisher.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_shutdown_while_disconnected_skips_messages() {
    let mut publisher = Publisher::new(ScriptedSink::default(), DeliveryLevel::AtLeastOnce);

    publisher.shutdown(["mag"]).await;

    assert!(publisher.sink().published.is_empty());
    assert_eq!(publisher.sink().calls, vec![Call::Disconnect]);
}
