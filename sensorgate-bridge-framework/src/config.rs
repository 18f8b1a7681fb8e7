//! Configuration traits and utilities.

use std::path::Path;

use sensorgate_common::load_config;
use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{GatewayConfig, LoggingConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use sensorgate_bridge_framework::{BridgeConfig, GatewayConfig, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub gateway: GatewayConfig,
///     pub logging: LoggingConfig,
///     pub devices: Vec<MyDevice>,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn gateway(&self) -> &GatewayConfig {
///         &self.gateway
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<()> {
///         if self.devices.is_empty() {
///             return Err(BridgeError::validation("At least one device required"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the gateway configuration.
    fn gateway(&self) -> &GatewayConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation;
    /// call [`validate_gateway`] to keep the common checks.
    fn validate(&self) -> Result<()> {
        validate_gateway(self.gateway())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config(path)?;

        config.validate()?;

        Ok(config)
    }
}

/// Checks shared by every bridge's gateway section.
pub fn validate_gateway(gateway: &GatewayConfig) -> Result<()> {
    if gateway.host.trim().is_empty() {
        return Err(BridgeError::validation("gateway.host cannot be empty"));
    }
    if gateway.access_token.is_empty() {
        return Err(BridgeError::validation(
            "gateway.access_token cannot be empty",
        ));
    }
    if gateway.client_id.is_empty() {
        return Err(BridgeError::validation("gateway.client_id cannot be empty"));
    }
    if gateway.connect_timeout_secs == 0 {
        return Err(BridgeError::validation(
            "gateway.connect_timeout_secs must be at least 1",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        gateway: GatewayConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl BridgeConfig for TestConfig {
        fn gateway(&self) -> &GatewayConfig {
            &self.gateway
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_config_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ gateway: ").unwrap();

        let result = TestConfig::load(file.path());
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }

    #[test]
    fn test_missing_access_token_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ gateway: {{ host: "localhost" }} }}"#).unwrap();

        let result = TestConfig::load(file.path());
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_valid_config_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ gateway: {{ host: "localhost", access_token: "token" }} }}"#
        )
        .unwrap();

        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.gateway.port, 1883);
        assert_eq!(config.logging.level, "info");
    }
}
