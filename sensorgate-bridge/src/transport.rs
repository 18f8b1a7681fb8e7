//! Bus and serial transports.
//!
//! Register devices talk through a [`RegisterBus`]; devices on the same bus
//! path share one handle. Line devices talk through a [`LineTransport`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use embedded_hal::i2c::I2c;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPort, SerialStream};
use tracing::{debug, info, trace};

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Bus error (address 0x{address:02X}, register 0x{register:02X}): {message}")]
    Bus {
        address: u8,
        register: u8,
        message: String,
    },
    #[error("Serial error: {0}")]
    Serial(String),
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },
    #[error("Bus handle poisoned: {0}")]
    Lock(String),
    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}

/// Byte-oriented register access on a shared bus.
///
/// Calls block until the transfer completes or the underlying driver gives up.
pub trait RegisterBus {
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8, TransportError>;

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<(), TransportError>;

    /// Read `len` consecutive registers starting at `register`.
    fn read_block(
        &mut self,
        address: u8,
        register: u8,
        len: usize,
    ) -> Result<Vec<u8>, TransportError>;
}

/// A bus handle shared by every device on the same bus path.
pub type SharedBus = Arc<Mutex<dyn RegisterBus + Send>>;

/// Wrap a bus so it can be shared between devices.
pub fn share_bus<B: RegisterBus + Send + 'static>(bus: B) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// [`RegisterBus`] over any `embedded-hal` I2C implementation.
///
/// A register read writes the register pointer and reads back in one
/// repeated-start transfer; a register write sends `[register, value]`.
pub struct I2cBus<I> {
    i2c: I,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Give back the wrapped driver.
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> RegisterBus for I2cBus<I> {
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8, TransportError> {
        let mut buf = [0u8];
        self.i2c
            .write_read(address, &[register], &mut buf)
            .map_err(|e| bus_error(address, register, e))?;
        trace!(address, register, value = buf[0], "read_byte");
        Ok(buf[0])
    }

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<(), TransportError> {
        self.i2c
            .write(address, &[register, value])
            .map_err(|e| bus_error(address, register, e))?;
        trace!(address, register, value, "write_byte");
        Ok(())
    }

    fn read_block(
        &mut self,
        address: u8,
        register: u8,
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        self.i2c
            .write_read(address, &[register], &mut buf)
            .map_err(|e| bus_error(address, register, e))?;
        trace!(address, register, ?buf, "read_block");
        Ok(buf)
    }
}

fn bus_error<E: core::fmt::Debug>(address: u8, register: u8, err: E) -> TransportError {
    TransportError::Bus {
        address,
        register,
        message: format!("{:?}", err),
    }
}

/// Open a Linux I2C character device such as `/dev/i2c-1`.
#[cfg(target_os = "linux")]
pub fn open_i2c_bus(path: &str) -> Result<SharedBus, TransportError> {
    let dev = linux_embedded_hal::I2cdev::new(path).map_err(|e| TransportError::Open {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    info!(bus = %path, "Opened I2C bus");
    Ok(share_bus(I2cBus::new(dev)))
}

/// Open a Linux I2C character device such as `/dev/i2c-1`.
#[cfg(not(target_os = "linux"))]
pub fn open_i2c_bus(path: &str) -> Result<SharedBus, TransportError> {
    Err(TransportError::Unsupported(format!(
        "I2C bus {} requires Linux i2c-dev",
        path
    )))
}

/// Opens each bus path once and hands out shared handles.
pub struct BusRegistry {
    opener: Box<dyn Fn(&str) -> Result<SharedBus, TransportError> + Send>,
    buses: HashMap<String, SharedBus>,
}

impl BusRegistry {
    /// Registry backed by the platform I2C driver.
    pub fn new() -> Self {
        Self::with_opener(open_i2c_bus)
    }

    /// Registry with a custom opener.
    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn(&str) -> Result<SharedBus, TransportError> + Send + 'static,
    {
        Self {
            opener: Box::new(opener),
            buses: HashMap::new(),
        }
    }

    /// Return the handle for `path`, opening it on first use.
    pub fn bus(&mut self, path: &str) -> Result<SharedBus, TransportError> {
        if let Some(bus) = self.buses.get(path) {
            debug!(bus = %path, "Reusing shared bus handle");
            return Ok(bus.clone());
        }
        let bus = (self.opener)(path)?;
        self.buses.insert(path.to_string(), bus.clone());
        Ok(bus)
    }

    /// Number of distinct buses opened so far.
    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Newline-terminated text stream.
#[async_trait]
pub trait LineTransport: Send {
    /// Whether unread input is waiting.
    async fn data_available(&mut self) -> Result<bool, TransportError>;

    /// Read one line without its terminator.
    ///
    /// Returns an empty string if no complete line arrives within `timeout`.
    /// Bytes of an incomplete line are kept for the next call.
    async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError>;
}

/// [`LineTransport`] over a serial port.
pub struct SerialLineTransport {
    port: String,
    reader: BufReader<SerialStream>,
    pending: Vec<u8>,
}

impl SerialLineTransport {
    /// Open the port and discard any stale input.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let builder = tokio_serial::new(port, baud_rate);
        let stream = SerialStream::open(&builder).map_err(|e| TransportError::Open {
            path: port.to_string(),
            message: e.to_string(),
        })?;
        stream
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        info!(port = %port, baud_rate, "Opened serial port");

        Ok(Self {
            port: port.to_string(),
            reader: BufReader::new(stream),
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl LineTransport for SerialLineTransport {
    async fn data_available(&mut self) -> Result<bool, TransportError> {
        if !self.reader.buffer().is_empty() {
            return Ok(true);
        }
        let waiting = self
            .reader
            .get_ref()
            .bytes_to_read()
            .map_err(|e| TransportError::Serial(e.to_string()))?;
        Ok(waiting > 0)
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        // read_until appends partial input to `pending` even when the timeout fires.
        match tokio::time::timeout(timeout, self.reader.read_until(b'\n', &mut self.pending)).await
        {
            Err(_) => Ok(String::new()),
            Ok(Err(e)) => Err(TransportError::Serial(e.to_string())),
            Ok(Ok(0)) => Err(TransportError::Serial(format!("{} closed", self.port))),
            Ok(Ok(_)) => {
                let bytes = std::mem::take(&mut self.pending);
                Ok(String::from_utf8_lossy(&bytes).trim().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation, SevenBitAddress};

    /// Register file behind a fake I2C peripheral with auto-increment.
    struct FakeI2c {
        address: u8,
        registers: [u8; 256],
        pointer: usize,
    }

    #[derive(Debug)]
    struct Nack;

    impl embedded_hal::i2c::Error for Nack {
        fn kind(&self) -> ErrorKind {
            ErrorKind::NoAcknowledge(embedded_hal::i2c::NoAcknowledgeSource::Address)
        }
    }

    impl ErrorType for FakeI2c {
        type Error = Nack;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != self.address {
                return Err(Nack);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        if let Some((&reg, rest)) = bytes.split_first() {
                            self.pointer = reg as usize;
                            for b in rest {
                                self.registers[self.pointer] = *b;
                                self.pointer = (self.pointer + 1) % 256;
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        for b in buf.iter_mut() {
                            *b = self.registers[self.pointer];
                            self.pointer = (self.pointer + 1) % 256;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    fn fake(address: u8) -> FakeI2c {
        FakeI2c {
            address,
            registers: [0; 256],
            pointer: 0,
        }
    }

    #[test]
    fn test_i2c_bus_byte_access() {
        let mut i2c = fake(0x1E);
        i2c.registers[0x4F] = 0x40;
        let mut bus = I2cBus::new(i2c);

        assert_eq!(bus.read_byte(0x1E, 0x4F).unwrap(), 0x40);

        bus.write_byte(0x1E, 0x60, 0x0C).unwrap();
        assert_eq!(bus.read_byte(0x1E, 0x60).unwrap(), 0x0C);
        assert_eq!(bus.release().registers[0x60], 0x0C);
    }

    #[test]
    fn test_i2c_bus_block_read() {
        let mut i2c = fake(0x1E);
        i2c.registers[0x68..0x6E].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        let mut bus = I2cBus::new(i2c);

        assert_eq!(bus.read_block(0x1E, 0x68, 6).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_i2c_bus_nack_is_bus_error() {
        let mut bus = I2cBus::new(fake(0x1E));

        match bus.read_byte(0x1D, 0x0F) {
            Err(TransportError::Bus {
                address, register, ..
            }) => {
                assert_eq!(address, 0x1D);
                assert_eq!(register, 0x0F);
            }
            other => panic!("expected bus error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_registry_opens_each_path_once() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let log = opened.clone();
        let mut registry = BusRegistry::with_opener(move |path| {
            log.lock().unwrap().push(path.to_string());
            Ok(share_bus(I2cBus::new(fake(0x1E))))
        });

        let a = registry.bus("/dev/i2c-1").unwrap();
        let b = registry.bus("/dev/i2c-1").unwrap();
        registry.bus("/dev/i2c-2").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert_eq!(*opened.lock().unwrap(), vec!["/dev/i2c-1", "/dev/i2c-2"]);
    }

    #[test]
    fn test_registry_propagates_open_failure() {
        let mut registry = BusRegistry::with_opener(|path| {
            Err(TransportError::Open {
                path: path.to_string(),
                message: "No such file or directory".to_string(),
            })
        });

        assert!(matches!(
            registry.bus("/dev/i2c-9"),
            Err(TransportError::Open { .. })
        ));
        assert!(registry.is_empty());
    }
}
