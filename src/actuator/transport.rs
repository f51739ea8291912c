//! Serial transport boundary
//!
//! The protocol layer talks to a byte-stream abstraction so tests can
//! inject scripted endpoints. The production implementation wraps the
//! `serialport` crate.

use std::io::{self, Read, Write};
use std::time::Duration;

/// Byte-stream channel to one serial endpoint
pub trait SerialTransport: Send {
    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read available bytes into `buf`. Returns `Ok(0)` when the read
    /// timeout elapses with no data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard any pending input and output
    fn clear_buffers(&mut self) -> io::Result<()>;

    /// Negotiated baud rate of this channel
    fn baud_rate(&self) -> u32;
}

/// Enumerates and opens serial endpoints
pub trait TransportFactory: Send + Sync {
    /// Platform-specific endpoint identifiers, in probe order
    fn list_ports(&self) -> io::Result<Vec<String>>;

    /// Open an endpoint at the given baud with a per-read timeout
    fn open(
        &self,
        port: &str,
        baud: u32,
        timeout: Duration,
    ) -> io::Result<Box<dyn SerialTransport>>;
}

/// Production factory backed by the operating system's serial stack
pub struct SystemSerial;

impl TransportFactory for SystemSerial {
    fn list_ports(&self) -> io::Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(io::Error::from)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(
        &self,
        port: &str,
        baud: u32,
        timeout: Duration,
    ) -> io::Result<Box<dyn SerialTransport>> {
        let inner = serialport::new(port, baud)
            .timeout(timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(SystemPort { inner, baud }))
    }
}

struct SystemPort {
    inner: Box<dyn serialport::SerialPort>,
    baud: u32,
}

impl SerialTransport for SystemPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.inner, data)?;
        self.inner.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Read::read(&mut self.inner, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        self.inner
            .clear(serialport::ClearBuffer::All)
            .map_err(io::Error::from)
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }
}
