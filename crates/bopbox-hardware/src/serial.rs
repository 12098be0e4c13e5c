//! UART link backed by the `serialport` crate.

use crate::{HardwareError, Result, traits::SerialLink};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Read timeout for the underlying port. Reads are only issued once bytes
/// are known to be waiting, so this only bounds a misbehaving driver.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// A real serial port speaking 8N1 at a fixed baud rate.
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialPortLink {
    /// Open the port at `path` (e.g. `/dev/ttyUSB0`).
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::SerialPort` if the OS refuses to open the port.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        if baud_rate == 0 {
            return Err(HardwareError::configuration("baud rate must be non-zero"));
        }

        let port = serialport::new(path, baud_rate)
            .timeout(PORT_READ_TIMEOUT)
            .open()?;

        info!(path, baud_rate, "Serial port opened");

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    /// Path this link was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("path", &self.path)
            .finish()
    }
}

impl SerialLink for SerialPortLink {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.port.write(data)?;
        self.port.flush()?;
        Ok(written)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let pending = self.bytes_available()?;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; pending];
        let n = match self.port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(e.into()),
        };
        buf.truncate(n);

        debug!(path = %self.path, bytes = n, "Serial read");
        Ok(buf)
    }
}
