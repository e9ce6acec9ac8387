//! Protocol errors

use thiserror::Error;

/// Errors that can occur while building commands or talking to the generator
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{parameter} value {value} is out of range {min}..={max}")]
    OutOfRange {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(err.description),
            _ => ProtocolError::SerialError(err.description),
        }
    }
}
