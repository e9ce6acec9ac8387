//! Generator Line Protocol
//!
//! ASCII commands and replies exchanged with UART-GEN firmware over a serial
//! link, plus port discovery and control sessions built on top of them.
//!
//! Every line is terminated by `\n`; the device answers with `\r\n`.

pub mod clock;
pub mod command_builder;
pub mod commands;
mod config;
pub mod discovery;
mod error;
pub mod probe;
pub mod response;
pub mod serial;
pub mod session;
pub mod simulator;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command_builder::{
    build_duty_command, build_frequency_command, build_identity_query_command, build_off_command,
    build_on_command, build_status_query_command, CommandBuilder,
};
pub use commands::{Command, CommandKind};
pub use config::{DeviceProfile, ProbeConfig, SessionConfig, Settings};
pub use discovery::{candidate_names, Discovery, DiscoveryReport};
pub use error::ProtocolError;
pub use probe::{ProbeReport, Prober};
pub use response::{
    classify_line, contains_device_signature, is_acknowledgement, is_error_reply,
    parse_acknowledgement, parse_identity, parse_status_line, Acknowledgement, DeviceIdentity,
    Reply, ResponseParser, StatusReply,
};
pub use serial::{list_ports, open_port, PortInfo};
pub use session::{LineSplitter, Session, SessionEvent};
pub use simulator::{SimulatedGenerator, SimulatedOpener, SimulatorMode};
pub use transport::{OpenSettings, SerialOpener, SerialTransport, Transport, TransportOpener};

/// Default baud rate of the generator firmware
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Substring every compliant identity reply contains
pub const DEVICE_SIGNATURE: &str = "UART-GEN";
