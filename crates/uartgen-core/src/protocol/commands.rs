//! Protocol commands
//!
//! Defines the line commands understood by the generator firmware.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a command asks the generator to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Set output frequency in Hz (`FREQ <hz>`)
    SetFrequency(u32),

    /// Set duty cycle in percent (`DUTY <percent>`)
    SetDuty(u32),

    /// Enable the output (`ON`)
    OutputOn,

    /// Disable the output (`OFF`)
    OutputOff,

    /// Request a status line (`?`)
    QueryStatus,

    /// Request the identity reply (`VER?`)
    QueryIdentity,
}

impl CommandKind {
    fn render(&self) -> String {
        match self {
            CommandKind::SetFrequency(hz) => format!("FREQ {}", hz),
            CommandKind::SetDuty(percent) => format!("DUTY {}", percent),
            CommandKind::OutputOn => "ON".to_string(),
            CommandKind::OutputOff => "OFF".to_string(),
            CommandKind::QueryStatus => "?".to_string(),
            CommandKind::QueryIdentity => "VER?".to_string(),
        }
    }
}

/// A validated command line.
///
/// Only the builders in [`command_builder`](super::command_builder) create
/// these, so a `Command` always carries in-range parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    line: String,
}

impl Command {
    pub(crate) fn new(kind: CommandKind) -> Self {
        Self {
            line: kind.render(),
            kind,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Command text without the line terminator
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Convert command to bytes, appending the newline the firmware splits on
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.line.len() + 1);
        bytes.extend_from_slice(self.line.as_bytes());
        bytes.push(b'\n');
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.line
    }
}
