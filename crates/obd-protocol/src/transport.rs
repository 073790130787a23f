//! Serial Transport and Clock Source
//!
//! The client talks to the adapter and reads time only through these traits,
//! so tests can hand it a scripted byte source and a manual clock.

use crate::error::ObdError;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

/// Default baud rate of the OBD-II UART adapter
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Byte-oriented, non-blocking link to the adapter
pub trait SerialTransport {
    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> Result<usize, ObdError>;

    /// Read one byte, `None` if nothing is pending
    fn read_byte(&mut self) -> Result<Option<u8>, ObdError>;

    /// Queue bytes for transmission
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ObdError>;

    /// Push queued bytes onto the wire
    fn flush(&mut self) -> Result<(), ObdError>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn bytes_available(&mut self) -> Result<usize, ObdError> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ObdError> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> Result<(), ObdError> {
        (**self).flush()
    }
}

/// Free-running monotonic millisecond counter
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Transport over a hardware serial port
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
}

impl SerialPortTransport {
    /// Open a serial port configured 8N1 without flow control
    ///
    /// # Arguments
    /// * `device` - Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `baud_rate` - Baud rate for serial communication
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Opening serial port {} at {} baud", device, baud_rate);

        let port = tokio_serial::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(1))
            .open()?;

        Ok(Self { port })
    }
}

impl SerialTransport for SerialPortTransport {
    fn bytes_available(&mut self) -> Result<usize, ObdError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ObdError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ObdError> {
        self.port.flush()?;
        Ok(())
    }
}
