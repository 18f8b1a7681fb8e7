//! Configuration for the sensor bridge.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sensorgate_bridge_framework::{
    BridgeConfig, BridgeError, GatewayConfig, LoggingConfig, Result, validate_gateway,
};
use sensorgate_common::DEFAULT_DEVICE_TYPE;

use crate::descriptor::{
    DEFAULT_LINE_TIMEOUT, DeviceDefinition, DeviceDescriptor, Interface, LineFormat, MIN_SETTLE,
    RegisterMap, ism303dac_accel, ism303dac_mag, sht45_trinkey,
};
use crate::poller::PollTiming;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorBridgeConfig {
    /// Gateway connection settings
    pub gateway: GatewayConfig,

    /// Sensor settings
    pub bridge: SensorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig for SensorBridgeConfig {
    fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        validate_gateway(&self.gateway)?;
        self.bridge.validate()
    }
}

/// What to do when a device answers with the wrong identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Stop the bridge.
    #[default]
    Abort,
    /// Log the mismatch and keep polling the other devices.
    Exclude,
}

/// Poll loop and device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Fixed delay between cycles in milliseconds (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before re-checking when no device was ready (default: 100)
    #[serde(default = "default_not_ready_delay_ms")]
    pub not_ready_delay_ms: u64,

    #[serde(default)]
    pub identity_policy: IdentityPolicy,

    /// Devices to poll
    pub devices: Vec<DeviceConfig>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_not_ready_delay_ms() -> u64 {
    100
}

impl SensorConfig {
    pub fn timing(&self) -> PollTiming {
        PollTiming {
            interval: Duration::from_millis(self.poll_interval_ms),
            not_ready_delay: Duration::from_millis(self.not_ready_delay_ms),
        }
    }

    /// Resolve presets and custom drivers into device definitions.
    pub fn definitions(&self) -> Vec<DeviceDefinition> {
        self.devices.iter().map(DeviceConfig::definition).collect()
    }

    /// Validate the sensor settings.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(BridgeError::validation(
                "At least one device must be configured",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::validation(
                "bridge.poll_interval_ms must be at least 1",
            ));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(BridgeError::validation("Device name cannot be empty"));
            }
            if !names.insert(device.name.as_str()) {
                return Err(BridgeError::validation(format!(
                    "Duplicate device name '{}'",
                    device.name
                )));
            }
            device.driver.validate(&device.name)?;
        }

        Ok(())
    }
}

/// Configuration for a single device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name reported to the gateway
    pub name: String,

    /// Gateway device type (default: "default")
    #[serde(default = "default_device_type")]
    pub device_type: String,

    pub driver: DriverConfig,
}

fn default_device_type() -> String {
    DEFAULT_DEVICE_TYPE.to_string()
}

impl DeviceConfig {
    pub fn definition(&self) -> DeviceDefinition {
        let mut definition = self.driver.definition(&self.name);
        definition.descriptor = definition.descriptor.with_device_type(self.device_type.as_str());
        definition
    }
}

/// Device driver: a preset or a fully described custom device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverConfig {
    /// ISM303DAC magnetometer over I2C
    Ism303dacMagnetometer {
        #[serde(default = "default_i2c_bus")]
        bus: String,
        #[serde(default = "default_mag_address")]
        address: u8,
    },
    /// ISM303DAC accelerometer over I2C
    Ism303dacAccelerometer {
        #[serde(default = "default_i2c_bus")]
        bus: String,
        #[serde(default = "default_accel_address")]
        address: u8,
    },
    /// Adafruit SHT45 Trinkey over USB serial
    Sht45Trinkey {
        #[serde(default = "default_trinkey_port")]
        port: String,
        #[serde(default = "default_trinkey_baud_rate")]
        baud_rate: u32,
    },
    /// Custom register device
    Register {
        #[serde(default = "default_i2c_bus")]
        bus: String,
        address: u8,
        identity_register: u8,
        expected_identity: u8,
        #[serde(default)]
        config_writes: Vec<(u8, u8)>,
        #[serde(default = "default_settle_ms")]
        settle_ms: u64,
        ready_register: u8,
        ready_mask: u8,
        data_register: u8,
        /// Axis names; each axis is one little-endian 16-bit word
        axes: Vec<String>,
        sensitivity: f64,
    },
    /// Custom delimited line device
    Line {
        port: String,
        baud_rate: u32,
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default)]
        skip_fields: usize,
        fields: Vec<String>,
        #[serde(default = "default_sensitivity")]
        sensitivity: f64,
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
}

fn default_i2c_bus() -> String {
    "/dev/i2c-1".to_string()
}

fn default_mag_address() -> u8 {
    ism303dac_mag::ADDRESS
}

fn default_accel_address() -> u8 {
    ism303dac_accel::ADDRESS
}

fn default_trinkey_port() -> String {
    sht45_trinkey::PORT.to_string()
}

fn default_trinkey_baud_rate() -> u32 {
    sht45_trinkey::BAUD_RATE
}

fn default_settle_ms() -> u64 {
    MIN_SETTLE.as_millis() as u64
}

fn default_delimiter() -> char {
    ','
}

fn default_sensitivity() -> f64 {
    1.0
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_LINE_TIMEOUT.as_millis() as u64
}

impl DriverConfig {
    fn definition(&self, name: &str) -> DeviceDefinition {
        match self {
            DriverConfig::Ism303dacMagnetometer { bus, address } => {
                DeviceDefinition::ism303dac_magnetometer(name, bus.as_str(), *address)
            }
            DriverConfig::Ism303dacAccelerometer { bus, address } => {
                DeviceDefinition::ism303dac_accelerometer(name, bus.as_str(), *address)
            }
            DriverConfig::Sht45Trinkey { port, baud_rate } => {
                DeviceDefinition::sht45_trinkey(name, port.as_str(), *baud_rate)
            }
            DriverConfig::Register {
                bus,
                address,
                identity_register,
                expected_identity,
                config_writes,
                settle_ms,
                ready_register,
                ready_mask,
                data_register,
                axes,
                sensitivity,
            } => DeviceDefinition {
                descriptor: DeviceDescriptor::new(name, *sensitivity, axes.iter().cloned()),
                interface: Interface::Register(RegisterMap {
                    bus: bus.clone(),
                    address: *address,
                    identity_register: *identity_register,
                    expected_identity: *expected_identity,
                    config_writes: config_writes.clone(),
                    settle: Duration::from_millis(*settle_ms),
                    ready_register: *ready_register,
                    ready_mask: *ready_mask,
                    data_register: *data_register,
                }),
            },
            DriverConfig::Line {
                port,
                baud_rate,
                delimiter,
                skip_fields,
                fields,
                sensitivity,
                read_timeout_ms,
            } => DeviceDefinition {
                descriptor: DeviceDescriptor::new(name, *sensitivity, fields.iter().cloned()),
                interface: Interface::Line(LineFormat {
                    port: port.clone(),
                    baud_rate: *baud_rate,
                    delimiter: *delimiter,
                    skip_fields: *skip_fields,
                    read_timeout: Duration::from_millis(*read_timeout_ms),
                }),
            },
        }
    }

    fn validate(&self, device: &str) -> Result<()> {
        let fail = |msg: &str| {
            Err(BridgeError::validation(format!(
                "Device '{}': {}",
                device, msg
            )))
        };

        match self {
            DriverConfig::Ism303dacMagnetometer { address, .. }
            | DriverConfig::Ism303dacAccelerometer { address, .. } => {
                if *address > 0x7F {
                    return fail("address must be a 7-bit I2C address");
                }
            }
            DriverConfig::Sht45Trinkey { port, baud_rate } => {
                if port.is_empty() {
                    return fail("port cannot be empty");
                }
                if *baud_rate == 0 {
                    return fail("baud_rate must be positive");
                }
            }
            DriverConfig::Register {
                address,
                settle_ms,
                ready_mask,
                axes,
                sensitivity,
                ..
            } => {
                if *address > 0x7F {
                    return fail("address must be a 7-bit I2C address");
                }
                if *ready_mask == 0 {
                    return fail("ready_mask cannot be zero");
                }
                if axes.is_empty() {
                    return fail("at least one axis is required");
                }
                if *settle_ms < default_settle_ms() {
                    return fail("settle_ms must be at least 100");
                }
                if !sensitivity.is_finite() {
                    return fail("sensitivity must be finite");
                }
            }
            DriverConfig::Line {
                port,
                baud_rate,
                fields,
                sensitivity,
                read_timeout_ms,
                ..
            } => {
                if port.is_empty() {
                    return fail("port cannot be empty");
                }
                if *baud_rate == 0 {
                    return fail("baud_rate must be positive");
                }
                if fields.is_empty() {
                    return fail("at least one field is required");
                }
                if !sensitivity.is_finite() {
                    return fail("sensitivity must be finite");
                }
                if *read_timeout_ms == 0 {
                    return fail("read_timeout_ms must be at least 1");
                }
            }
        }

        Ok(())
    }
}
