//! MQTT telemetry sink using rumqttc.
//!
//! The rumqttc event loop runs on its own task once connected. That task
//! owns delivery acknowledgements and the connected flag; the sink itself
//! only queues messages and asks the event loop to reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sink::{MessageId, SinkError, TelemetrySink};
use crate::{DeliveryLevel, GatewayConfig};

/// Capacity of the rumqttc request channel.
const REQUEST_CAPACITY: usize = 10;

/// How long a graceful disconnect may take before the event loop is aborted.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

type ReconnectReply = oneshot::Sender<Result<(), String>>;

/// Map a delivery level onto an MQTT QoS.
pub fn qos(delivery: DeliveryLevel) -> QoS {
    match delivery {
        DeliveryLevel::AtMostOnce => QoS::AtMostOnce,
        DeliveryLevel::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// [`TelemetrySink`] backed by an MQTT broker.
pub struct MqttSink {
    config: GatewayConfig,
    client: Option<AsyncClient>,
    connected: Arc<AtomicBool>,
    reconnect_tx: Option<mpsc::Sender<ReconnectReply>>,
    event_loop: Option<JoinHandle<()>>,
    last_message_id: MessageId,
}

impl MqttSink {
    /// Create an unconnected sink.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_tx: None,
            event_loop: None,
            last_message_id: 0,
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keep_alive());
        options.set_credentials(self.config.access_token.clone(), "");
        options
    }

    fn connect_error(&self, message: impl Into<String>) -> SinkError {
        SinkError::Connect {
            broker: self.config.broker_addr(),
            message: message.into(),
        }
    }

    fn stop_event_loop(&mut self) {
        self.reconnect_tx = None;
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
        self.client = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl TelemetrySink for MqttSink {
    async fn connect(&mut self) -> Result<(), SinkError> {
        self.stop_event_loop();

        info!(
            broker = %self.config.broker_addr(),
            client_id = %self.config.client_id,
            "Connecting to gateway"
        );

        let (client, mut event_loop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        match tokio::time::timeout(self.config.connect_timeout(), wait_for_connack(&mut event_loop))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(self.connect_error(message)),
            Err(_) => return Err(self.connect_error("timed out waiting for CONNACK")),
        }

        self.connected.store(true, Ordering::SeqCst);

        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        self.event_loop = Some(tokio::spawn(drive_event_loop(
            event_loop,
            self.connected.clone(),
            reconnect_rx,
        )));
        self.reconnect_tx = Some(reconnect_tx);
        self.client = Some(client);

        info!(broker = %self.config.broker_addr(), "Connected to gateway");
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &Value,
        delivery: DeliveryLevel,
    ) -> Result<MessageId, SinkError> {
        if !self.is_connected() {
            return Err(SinkError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(SinkError::NotConnected)?;

        let bytes = serde_json::to_vec(payload).map_err(|e| SinkError::Publish {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;

        client
            .try_publish(topic, qos(delivery), false, bytes)
            .map_err(|e| SinkError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        self.last_message_id += 1;
        Ok(self.last_message_id)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&mut self) -> Result<(), SinkError> {
        if self.is_connected() {
            return Ok(());
        }

        let Some(requests) = self.reconnect_tx.clone() else {
            return self.connect().await;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        match requests.try_send(reply_tx) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                return Err(self.connect_error("reconnect already in progress"));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // The event loop task ended; start over with a fresh client.
                return self.connect().await;
            }
        }

        info!(broker = %self.config.broker_addr(), "Reconnecting to gateway");

        match tokio::time::timeout(self.config.connect_timeout(), reply_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(self.connect_error(message)),
            Ok(Err(_)) => Err(self.connect_error("event loop stopped")),
            Err(_) => Err(self.connect_error("timed out waiting for CONNACK")),
        }
    }

    async fn disconnect(&mut self) -> Result<(), SinkError> {
        let result = match self.client.take() {
            Some(client) if self.is_connected() => {
                client.try_disconnect().map_err(|e| self.connect_error(e.to_string()))
            }
            _ => Ok(()),
        };

        self.reconnect_tx = None;
        if let Some(mut handle) = self.event_loop.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);

        info!(broker = %self.config.broker_addr(), "Disconnected from gateway");
        result
    }
}

/// Poll until the broker answers the CONNECT.
async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), String> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("connection refused: {:?}", ack.code))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Event loop task.
///
/// After a connection error the task parks until a reconnect request arrives;
/// the next `poll` then makes one reconnect attempt and the outcome is sent
/// back on the request's reply channel.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    connected: Arc<AtomicBool>,
    mut requests: mpsc::Receiver<ReconnectReply>,
) {
    let mut pending: Option<ReconnectReply> = None;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                connected.store(true, Ordering::SeqCst);
                info!(session_present = ack.session_present, "Gateway connection established");
                if let Some(reply) = pending.take() {
                    let _ = reply.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                debug!(pkid = ack.pkid, "Message acknowledged");
            }
            Ok(Event::Incoming(Packet::PubComp(ack))) => {
                debug!(pkid = ack.pkid, "Message delivery complete");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                debug!("Disconnect sent");
                break;
            }
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
            }
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                warn!(error = %e, "Gateway connection lost");
                if let Some(reply) = pending.take() {
                    let _ = reply.send(Err(e.to_string()));
                }
                match requests.recv().await {
                    Some(reply) => pending = Some(reply),
                    None => break,
                }
            }
        }
    }
}
