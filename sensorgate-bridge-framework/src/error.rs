//! Error types for the bridge framework.

use thiserror::Error;

use crate::sink::SinkError;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Telemetry sink error.
    #[error("Gateway error: {0}")]
    Sink(#[from] SinkError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}

impl From<sensorgate_common::Error> for BridgeError {
    fn from(err: sensorgate_common::Error) -> Self {
        use sensorgate_common::Error;

        match err {
            Error::ConfigNotFound { path } => Self::ConfigNotFound { path },
            Error::ConfigParse(msg) => Self::ConfigParse(msg),
            Error::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}
