//! Device reader: identity check, configuration, ready gating and sampling.

use async_trait::async_trait;
use sensorgate_common::TelemetryEnvelope;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::IdentityPolicy;
use crate::convert::{RawSample, convert_sample, decode_le_axes};
use crate::descriptor::{
    DeviceDefinition, DeviceDescriptor, Interface, LineFormat, LineParseError, MIN_SETTLE,
    RegisterMap,
};
use crate::transport::{
    BusRegistry, LineTransport, RegisterBus, SerialLineTransport, SharedBus, TransportError,
};

/// Device-level failures.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("identity mismatch: expected 0x{expected:02X}, read 0x{actual:02X}")]
    IdentityMismatch { expected: u8, actual: u8 },

    #[error("register 0x{register:02X} reads back 0x{read_back:02X} after writing 0x{written:02X}")]
    ConfigNotApplied {
        register: u8,
        written: u8,
        read_back: u8,
    },

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("malformed line {line:?}: {source}")]
    Parse {
        line: String,
        #[source]
        source: LineParseError,
    },

    /// The device signalled data but no complete sample arrived in time.
    #[error("no complete sample within the read timeout")]
    NoData,
}

impl DeviceError {
    /// Errors that only warrant a warning at startup.
    pub fn is_soft(&self) -> bool {
        matches!(self, DeviceError::ConfigNotApplied { .. })
    }
}

/// A physical device the poll loop can sample.
#[async_trait]
pub trait Device: Send {
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Confirm the expected part is answering.
    async fn verify_identity(&mut self) -> Result<(), DeviceError>;

    /// Apply the sampling configuration and check it stuck.
    async fn configure(&mut self) -> Result<(), DeviceError>;

    /// Whether a fresh sample is waiting.
    async fn is_ready(&mut self) -> Result<bool, DeviceError>;

    async fn read_sample(&mut self) -> Result<RawSample, DeviceError>;
}

/// Device behind a register bus.
pub struct RegisterDevice {
    descriptor: DeviceDescriptor,
    map: RegisterMap,
    bus: SharedBus,
}

impl RegisterDevice {
    pub fn new(descriptor: DeviceDescriptor, map: RegisterMap, bus: SharedBus) -> Self {
        Self {
            descriptor,
            map,
            bus,
        }
    }

    fn sample_width(&self) -> usize {
        self.descriptor.fields.len() * 2
    }

    fn with_bus<T>(
        &self,
        f: impl FnOnce(&mut (dyn RegisterBus + Send)) -> Result<T, TransportError>,
    ) -> Result<T, DeviceError> {
        let mut bus = self
            .bus
            .lock()
            .map_err(|e| TransportError::Lock(e.to_string()))?;
        Ok(f(&mut *bus)?)
    }
}

#[async_trait]
impl Device for RegisterDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn verify_identity(&mut self) -> Result<(), DeviceError> {
        let (address, register) = (self.map.address, self.map.identity_register);
        let actual = self.with_bus(|bus| bus.read_byte(address, register))?;
        info!(
            device = %self.descriptor.name,
            register = format_args!("0x{:02X}", register),
            value = format_args!("0x{:02X}", actual),
            "Read identity register"
        );

        if actual != self.map.expected_identity {
            return Err(DeviceError::IdentityMismatch {
                expected: self.map.expected_identity,
                actual,
            });
        }
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), DeviceError> {
        let address = self.map.address;
        for &(register, value) in &self.map.config_writes {
            self.with_bus(|bus| bus.write_byte(address, register, value))?;
            debug!(
                device = %self.descriptor.name,
                register = format_args!("0x{:02X}", register),
                value = format_args!("0x{:02X}", value),
                "Wrote configuration register"
            );
        }

        tokio::time::sleep(self.map.settle.max(MIN_SETTLE)).await;

        // One read-back check per written register; no retries.
        for &(register, written) in &self.map.config_writes {
            let read_back = self.with_bus(|bus| bus.read_byte(address, register))?;
            info!(
                device = %self.descriptor.name,
                register = format_args!("0x{:02X}", register),
                value = format_args!("0x{:02X}", read_back),
                "Configuration read back"
            );
            if read_back != written {
                return Err(DeviceError::ConfigNotApplied {
                    register,
                    written,
                    read_back,
                });
            }
        }
        Ok(())
    }

    async fn is_ready(&mut self) -> Result<bool, DeviceError> {
        let (address, register) = (self.map.address, self.map.ready_register);
        let status = self.with_bus(|bus| bus.read_byte(address, register))?;
        Ok(status & self.map.ready_mask != 0)
    }

    async fn read_sample(&mut self) -> Result<RawSample, DeviceError> {
        let width = self.sample_width();
        let (address, register) = (self.map.address, self.map.data_register);
        let bytes = self.with_bus(|bus| bus.read_block(address, register, width))?;
        if bytes.len() != width {
            return Err(DeviceError::ShortRead {
                expected: width,
                actual: bytes.len(),
            });
        }
        Ok(RawSample::Codes(decode_le_axes(&bytes, self.descriptor.fields.len())))
    }
}

/// Device that streams delimited text lines.
///
/// There is no identity register and nothing to configure.
pub struct LineDevice {
    descriptor: DeviceDescriptor,
    format: LineFormat,
    transport: Box<dyn LineTransport>,
}

impl LineDevice {
    pub fn new(
        descriptor: DeviceDescriptor,
        format: LineFormat,
        transport: Box<dyn LineTransport>,
    ) -> Self {
        Self {
            descriptor,
            format,
            transport,
        }
    }
}

#[async_trait]
impl Device for LineDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn verify_identity(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn is_ready(&mut self) -> Result<bool, DeviceError> {
        Ok(self.transport.data_available().await?)
    }

    async fn read_sample(&mut self) -> Result<RawSample, DeviceError> {
        let line = self.transport.read_line(self.format.read_timeout).await?;
        if line.is_empty() {
            return Err(DeviceError::NoData);
        }
        let values = self
            .format
            .parse(&line, self.descriptor.fields.len())
            .map_err(|source| DeviceError::Parse {
                line: line.clone(),
                source,
            })?;
        Ok(RawSample::Values(values))
    }
}

/// Lifecycle of a managed device. There is no way back to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Verified,
    Configured,
}

/// A device plus its lifecycle state.
pub struct ManagedDevice {
    device: Box<dyn Device>,
    state: DeviceState,
}

impl ManagedDevice {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            state: DeviceState::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        &self.device.descriptor().name
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.device.descriptor()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Verify identity, then configure.
    ///
    /// A configuration that does not read back is logged and tolerated.
    pub async fn initialize(&mut self) -> Result<(), DeviceError> {
        self.device.verify_identity().await?;
        self.state = DeviceState::Verified;

        match self.device.configure().await {
            Ok(()) => {}
            Err(e) if e.is_soft() => {
                warn!(device = %self.name(), error = %e, "Configuration not applied");
            }
            Err(e) => return Err(e),
        }
        self.state = DeviceState::Configured;
        info!(device = %self.name(), "Device initialized");
        Ok(())
    }

    /// Read a sample if, and only if, the device reports one ready.
    pub async fn read_if_ready(&mut self) -> Result<Option<RawSample>, DeviceError> {
        if !self.device.is_ready().await? {
            return Ok(None);
        }
        self.device.read_sample().await.map(Some)
    }

    /// Convert a raw sample into this device's envelope.
    pub fn envelope(&self, sample: &RawSample) -> TelemetryEnvelope {
        let descriptor = self.device.descriptor();
        descriptor.envelope(&convert_sample(sample, descriptor.sensitivity))
    }

    /// Ready check, read and convert in that order.
    pub async fn poll(&mut self) -> Result<Option<TelemetryEnvelope>, DeviceError> {
        Ok(self
            .read_if_ready()
            .await?
            .map(|sample| self.envelope(&sample)))
    }
}

/// Errors that stop the bridge before the loop starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("device '{device}': {source}")]
    Device {
        device: String,
        #[source]
        source: DeviceError,
    },
    #[error("no devices left to poll")]
    NoDevices,
}

/// Initialize every device.
///
/// Transport failures are always fatal. An identity mismatch is fatal under
/// [`IdentityPolicy::Abort`] and drops the device under
/// [`IdentityPolicy::Exclude`].
pub async fn initialize_all(
    devices: Vec<ManagedDevice>,
    policy: IdentityPolicy,
) -> Result<Vec<ManagedDevice>, StartupError> {
    let mut ready = Vec::with_capacity(devices.len());

    for mut device in devices {
        match device.initialize().await {
            Ok(()) => ready.push(device),
            Err(e @ DeviceError::IdentityMismatch { .. }) if policy == IdentityPolicy::Exclude => {
                error!(device = %device.name(), error = %e, phase = "startup", "Excluding device");
            }
            Err(source) => {
                error!(device = %device.name(), error = %source, phase = "startup", "Device initialization failed");
                return Err(StartupError::Device {
                    device: device.name().to_string(),
                    source,
                });
            }
        }
    }

    if ready.is_empty() {
        return Err(StartupError::NoDevices);
    }
    Ok(ready)
}

/// Open the transport for each definition.
///
/// Register devices on the same bus path share one bus handle.
pub fn open_devices(
    definitions: Vec<DeviceDefinition>,
    buses: &mut BusRegistry,
) -> Result<Vec<ManagedDevice>, TransportError> {
    let mut devices = Vec::with_capacity(definitions.len());

    for DeviceDefinition {
        descriptor,
        interface,
    } in definitions
    {
        let device: Box<dyn Device> = match interface {
            Interface::Register(map) => {
                let bus = buses.bus(&map.bus)?;
                Box::new(RegisterDevice::new(descriptor, map, bus))
            }
            Interface::Line(format) => {
                let transport = SerialLineTransport::open(&format.port, format.baud_rate)?;
                Box::new(LineDevice::new(descriptor, format, Box::new(transport)))
            }
        };
        devices.push(ManagedDevice::new(device));
    }

    Ok(devices)
}
