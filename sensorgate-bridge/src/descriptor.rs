//! Device descriptors and the built-in presets.
//!
//! A descriptor is built once at startup from configuration and never
//! changes afterwards. It carries everything the generic poll loop needs to
//! know about a part: where its registers are (or how its text lines are
//! laid out), how to scale raw codes, and what to call each value.

use std::time::Duration;

use sensorgate_common::{DEFAULT_DEVICE_TYPE, TelemetryEnvelope};

/// Minimum wait after configuration writes before reading them back.
pub const MIN_SETTLE: Duration = Duration::from_millis(100);

/// Default read timeout for line devices.
pub const DEFAULT_LINE_TIMEOUT: Duration = Duration::from_secs(1);

/// ISM303DAC magnetometer register map.
pub mod ism303dac_mag {
    pub const NAME: &str = "ISM303DAC Magnetometer";
    pub const ADDRESS: u8 = 0x1E;
    pub const WHO_AM_I: u8 = 0x4F;
    pub const WHO_AM_I_VALUE: u8 = 0x40;
    /// CFG_REG_A_M: 100 Hz, continuous mode.
    pub const CFG_REG_A: u8 = 0x60;
    pub const CFG_REG_A_VALUE: u8 = 0x0C;
    pub const STATUS_REG: u8 = 0x67;
    /// Zyxda: new X, Y and Z data available.
    pub const STATUS_ZYXDA: u8 = 0x08;
    pub const OUTX_L_REG: u8 = 0x68;
    /// mG per LSB.
    pub const SENSITIVITY: f64 = 1.5;
    pub const AXES: [&str; 3] = ["magneticX", "magneticY", "magneticZ"];
}

/// ISM303DAC accelerometer register map.
pub mod ism303dac_accel {
    pub const NAME: &str = "ISM303DAC Accelerometer";
    pub const ADDRESS: u8 = 0x1D;
    pub const WHO_AM_I: u8 = 0x0F;
    pub const WHO_AM_I_VALUE: u8 = 0x43;
    /// CTRL1: 100 Hz, +/-2 g, high resolution.
    pub const CTRL1: u8 = 0x10;
    pub const CTRL1_VALUE: u8 = 0x38;
    pub const STATUS: u8 = 0x1B;
    /// DRDY
    pub const STATUS_DRDY: u8 = 0x01;
    pub const OUT_X_L: u8 = 0x28;
    /// mg per LSB at +/-2 g.
    pub const SENSITIVITY: f64 = 0.061;
    pub const AXES: [&str; 3] = ["accelX", "accelY", "accelZ"];
}

/// SHT45 Trinkey line format: `<serial>,<temperature>,<humidity>,<touch>`.
pub mod sht45_trinkey {
    pub const NAME: &str = "SHT45 Trinkey Sensor";
    pub const PORT: &str = "/dev/ttyACM0";
    pub const BAUD_RATE: u32 = 115_200;
    pub const DELIMITER: char = ',';
    pub const SKIP_FIELDS: usize = 1;
    pub const FIELDS: [&str; 2] = ["temperature", "humidity"];
}

/// What a device reports and how values are scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Display name, used as the gateway device name.
    pub name: String,
    pub device_type: String,
    /// Raw code to physical unit factor.
    pub sensitivity: f64,
    /// Axis or field names, in sample order.
    pub fields: Vec<String>,
}

impl DeviceDescriptor {
    pub fn new<I, S>(name: impl Into<String>, sensitivity: f64, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            sensitivity,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Pair converted values with field names.
    ///
    /// Values beyond the named fields are dropped.
    pub fn envelope(&self, values: &[f64]) -> TelemetryEnvelope {
        self.fields.iter().zip(values).fold(
            TelemetryEnvelope::new(&self.name, &self.device_type),
            |envelope, (field, value)| envelope.with_field(field, *value),
        )
    }
}

/// Register layout of a bus device.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMap {
    /// Bus path, e.g. `/dev/i2c-1`.
    pub bus: String,
    /// 7-bit bus address.
    pub address: u8,
    pub identity_register: u8,
    pub expected_identity: u8,
    /// Applied once, in order, at startup.
    pub config_writes: Vec<(u8, u8)>,
    pub settle: Duration,
    pub ready_register: u8,
    pub ready_mask: u8,
    /// First output register; axes follow as little-endian words.
    pub data_register: u8,
}

/// Layout of a delimited text line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFormat {
    pub port: String,
    pub baud_rate: u32,
    pub delimiter: char,
    /// Leading fields to ignore (serial numbers and the like).
    pub skip_fields: usize,
    pub read_timeout: Duration,
}

/// Line did not match the expected format.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LineParseError {
    #[error("expected at least {expected} fields, got {actual}")]
    TooFewFields { expected: usize, actual: usize },
    #[error("field {index} is not numeric: {value:?}")]
    NotNumeric { index: usize, value: String },
}

impl LineFormat {
    /// Parse `count` numeric fields after the skipped prefix.
    ///
    /// Extra trailing fields are ignored.
    pub fn parse(&self, line: &str, count: usize) -> Result<Vec<f64>, LineParseError> {
        let parts: Vec<&str> = line.split(self.delimiter).collect();
        let expected = self.skip_fields + count;
        if parts.len() < expected {
            return Err(LineParseError::TooFewFields {
                expected,
                actual: parts.len(),
            });
        }

        parts[self.skip_fields..expected]
            .iter()
            .enumerate()
            .map(|(offset, raw)| {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| LineParseError::NotNumeric {
                        index: self.skip_fields + offset,
                        value: raw.to_string(),
                    })
            })
            .collect()
    }
}

/// How a device is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum Interface {
    Register(RegisterMap),
    Line(LineFormat),
}

/// A descriptor together with its attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDefinition {
    pub descriptor: DeviceDescriptor,
    pub interface: Interface,
}

impl DeviceDefinition {
    /// ISM303DAC magnetometer in continuous 100 Hz mode.
    pub fn ism303dac_magnetometer(name: impl Into<String>, bus: impl Into<String>, address: u8) -> Self {
        use ism303dac_mag::*;
        Self {
            descriptor: DeviceDescriptor::new(name, SENSITIVITY, AXES),
            interface: Interface::Register(RegisterMap {
                bus: bus.into(),
                address,
                identity_register: WHO_AM_I,
                expected_identity: WHO_AM_I_VALUE,
                config_writes: vec![(CFG_REG_A, CFG_REG_A_VALUE)],
                settle: MIN_SETTLE,
                ready_register: STATUS_REG,
                ready_mask: STATUS_ZYXDA,
                data_register: OUTX_L_REG,
            }),
        }
    }

    /// ISM303DAC accelerometer at 100 Hz, +/-2 g.
    pub fn ism303dac_accelerometer(name: impl Into<String>, bus: impl Into<String>, address: u8) -> Self {
        use ism303dac_accel::*;
        Self {
            descriptor: DeviceDescriptor::new(name, SENSITIVITY, AXES),
            interface: Interface::Register(RegisterMap {
                bus: bus.into(),
                address,
                identity_register: WHO_AM_I,
                expected_identity: WHO_AM_I_VALUE,
                config_writes: vec![(CTRL1, CTRL1_VALUE)],
                settle: MIN_SETTLE,
                ready_register: STATUS,
                ready_mask: STATUS_DRDY,
                data_register: OUT_X_L,
            }),
        }
    }

    /// Adafruit SHT45 Trinkey temperature/humidity stream.
    pub fn sht45_trinkey(name: impl Into<String>, port: impl Into<String>, baud_rate: u32) -> Self {
        use sht45_trinkey::*;
        Self {
            descriptor: DeviceDescriptor::new(name, 1.0, FIELDS),
            interface: Interface::Line(LineFormat {
                port: port.into(),
                baud_rate,
                delimiter: DELIMITER,
                skip_fields: SKIP_FIELDS,
                read_timeout: DEFAULT_LINE_TIMEOUT,
            }),
        }
    }

    /// Bytes read per sample: two per axis for register devices, zero for
    /// line devices.
    pub fn sample_width(&self) -> usize {
        match self.interface {
            Interface::Register(_) => self.descriptor.fields.len() * 2,
            Interface::Line(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trinkey_format() -> LineFormat {
        match DeviceDefinition::sht45_trinkey("t", "/dev/ttyACM0", 115_200).interface {
            Interface::Line(format) => format,
            Interface::Register(_) => unreachable!(),
        }
    }

    #[test]
    fn test_parse_trinkey_line() {
        let values = trinkey_format().parse("SN123,24.50,55.10,0", 2).unwrap();
        assert_eq!(values, vec![24.50, 55.10]);
    }

    #[test]
    fn test_parse_too_few_fields() {
        assert_eq!(
            trinkey_format().parse("SN123,24.50", 2),
            Err(LineParseError::TooFewFields {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_parse_non_numeric() {
        assert!(matches!(
            trinkey_format().parse("SN123,warm,55.10,0", 2),
            Err(LineParseError::NotNumeric { index: 1, .. })
        ));
    }

    #[test]
    fn test_presets_keep_their_own_sensitivity() {
        let mag = DeviceDefinition::ism303dac_magnetometer("m", "/dev/i2c-1", 0x1E);
        let acc = DeviceDefinition::ism303dac_accelerometer("a", "/dev/i2c-1", 0x1D);

        assert_eq!(mag.descriptor.sensitivity, 1.5);
        assert_eq!(acc.descriptor.sensitivity, 0.061);
        assert_eq!(mag.sample_width(), 6);
        assert_eq!(acc.sample_width(), 6);
    }

    #[test]
    fn test_envelope_pairs_fields_in_order() {
        let descriptor = DeviceDescriptor::new("dev", 1.0, ["X", "Y", "Z"]);
        let envelope = descriptor.envelope(&[1.0, 2.0, 3.0]);

        assert_eq!(envelope.device_name, "dev");
        assert_eq!(envelope.device_type, "default");
        assert_eq!(envelope.field("Y"), Some(2.0));
        assert_eq!(envelope.fields.len(), 3);
    }
}
