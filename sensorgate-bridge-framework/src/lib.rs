//! SensorGate Bridge Framework
//!
//! Common abstractions for building bridges that publish telemetry to a gateway.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`TelemetrySink`] trait and its MQTT implementation [`MqttSink`]
//! - [`Publisher`] owning the connection state and the reconnect discipline
//! - [`BridgeArgs`] for common CLI argument parsing

mod args;
mod config;
mod error;
mod mqtt;
mod publisher;
mod runner;
mod sink;

pub use args::{BridgeArgs, DEFAULT_CONFIG};
pub use config::{BridgeConfig, validate_gateway};
pub use error::{BridgeError, Result};
pub use mqtt::{MqttSink, qos};
pub use publisher::{ConnectionState, PublishStats, Publisher, ReconnectOutcome};
pub use runner::BridgeRunner;
pub use sink::{MessageId, SinkError, TelemetrySink};

// Re-export commonly used types from sensorgate-common
pub use sensorgate_common::{DeliveryLevel, GatewayConfig, LoggingConfig, TelemetryEnvelope};
