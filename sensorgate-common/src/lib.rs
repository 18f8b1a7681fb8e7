//! SensorGate Common Library
//!
//! This crate provides shared types and utilities for SensorGate telemetry bridges:
//!
//! - [`telemetry`] - Telemetry envelope and gateway payload builders
//! - [`topics`] - Gateway topic names
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod telemetry;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{
    DeliveryLevel, GatewayConfig, LogFormat, LoggingConfig, load_config, parse_config,
};
pub use error::{Error, Result};
pub use telemetry::{
    DEFAULT_DEVICE_TYPE, TelemetryEnvelope, announce_payload, disconnect_payload,
    gateway_telemetry_payload,
};
pub use topics::{CONNECT_TOPIC, DISCONNECT_TOPIC, TELEMETRY_TOPIC};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
