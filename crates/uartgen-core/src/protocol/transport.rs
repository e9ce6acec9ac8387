//! Byte transports
//!
//! The prober and session talk to a [`Transport`] rather than a concrete
//! serial port, and open ports through a [`TransportOpener`]. Production code
//! uses [`SerialOpener`]; tests and demo mode hand in the simulator.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{serial, ProtocolError};

/// Line settings applied when a port is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

/// A bidirectional byte stream to one device
pub trait Transport: Read + Write + Send {
    /// Drive the DTR and RTS handshake lines
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> io::Result<()>;

    /// Discard anything received but not yet read
    fn clear_input(&mut self) -> io::Result<()>;

    /// Second handle to the same device, for a dedicated reader
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;
}

/// Opens named endpoints
pub trait TransportOpener: Send + Sync {
    fn open(&self, port: &str, settings: &OpenSettings) -> Result<Box<dyn Transport>, ProtocolError>;
}

fn to_io(err: serialport::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// Serial port wrapper implementing [`Transport`].
///
/// serialport has a single timeout per handle; writes temporarily switch to
/// the write timeout so a short read timeout does not abort a slow write.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            port,
            read_timeout,
            write_timeout,
        }
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_timeout == self.read_timeout {
            return self.port.write(buf);
        }
        self.port.set_timeout(self.write_timeout).map_err(to_io)?;
        let result = self.port.write(buf);
        self.port.set_timeout(self.read_timeout).map_err(to_io)?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> io::Result<()> {
        self.port.write_data_terminal_ready(dtr).map_err(to_io)?;
        self.port.write_request_to_send(rts).map_err(to_io)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(to_io)
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(to_io)?;
        Ok(Box::new(SerialTransport::new(
            port,
            self.read_timeout,
            self.write_timeout,
        )))
    }
}

/// Opens real serial ports (8N1, no flow control)
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl TransportOpener for SerialOpener {
    fn open(&self, port: &str, settings: &OpenSettings) -> Result<Box<dyn Transport>, ProtocolError> {
        let handle = serial::open_port(port, settings.baud_rate, settings.read_timeout)?;
        Ok(Box::new(SerialTransport::new(
            handle,
            settings.read_timeout,
            settings.write_timeout,
        )))
    }
}
