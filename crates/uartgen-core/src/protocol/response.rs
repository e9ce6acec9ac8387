//! Response parsing
//!
//! Classifies lines received from the generator. The device interleaves boot
//! chatter and partial echoes with its replies, so status lines are searched
//! for rather than anchored, and nothing here treats an unrecognised line as
//! an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::DEVICE_SIGNATURE;

const OK_PREFIX: &str = "OK ";
const ERR_PREFIX: &str = "ERR ";

fn status_pattern() -> &'static Regex {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    STATUS_RE.get_or_init(|| {
        Regex::new(r"FREQ=(\d+)\s+DUTY=(\d+)\s+(ON|OFF)").expect("status pattern is valid")
    })
}

/// Generator state reported by a `FREQ=<n> DUTY=<n> ON|OFF` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    /// Output frequency in Hz
    pub frequency: u64,
    /// Duty cycle in percent
    pub duty: u64,
    /// Whether the output is running
    pub output_enabled: bool,
}

/// Reply to a control command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acknowledgement {
    /// `OK <text>`
    Ok(String),
    /// `ERR <text>`
    Error(String),
}

/// Parsed identity reply, e.g. `UART-GEN,1.0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub signature: String,
    pub version: Option<String>,
}

/// Classification of a single received line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Status(StatusReply),
    Ok(String),
    Error(String),
    Identity(DeviceIdentity),
    /// Anything else: boot banner, help text, noise
    Other(String),
}

/// Search `line` for a status report.
///
/// Returns `None` for lines without one; that is the common case on a stream
/// that also carries acknowledgements. Values are taken as reported, with no
/// range check.
pub fn parse_status_line(line: &str) -> Option<StatusReply> {
    let caps = status_pattern().captures(line.trim())?;
    let frequency = caps.get(1)?.as_str().parse().ok()?;
    let duty = caps.get(2)?.as_str().parse().ok()?;
    let output_enabled = caps.get(3)?.as_str() == "ON";
    Some(StatusReply {
        frequency,
        duty,
        output_enabled,
    })
}

/// True if the trimmed line starts with `OK `
pub fn is_acknowledgement(line: &str) -> bool {
    line.trim().starts_with(OK_PREFIX)
}

/// True if the trimmed line starts with `ERR `
pub fn is_error_reply(line: &str) -> bool {
    line.trim().starts_with(ERR_PREFIX)
}

/// Split an `OK`/`ERR` line into its kind and remaining text
pub fn parse_acknowledgement(line: &str) -> Option<Acknowledgement> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(OK_PREFIX) {
        return Some(Acknowledgement::Ok(rest.trim().to_string()));
    }
    line.strip_prefix(ERR_PREFIX)
        .map(|rest| Acknowledgement::Error(rest.trim().to_string()))
}

/// True if `text` contains the stock `UART-GEN` signature anywhere
pub fn contains_device_signature(text: &str) -> bool {
    ResponseParser::default().contains_signature(text)
}

/// Extract the identity token from a `VER?` reply
pub fn parse_identity(line: &str) -> Option<DeviceIdentity> {
    ResponseParser::default().parse_identity(line)
}

/// Classify a line against the stock signature
pub fn classify_line(line: &str) -> Option<Reply> {
    ResponseParser::default().classify(line)
}

/// Parser bound to a particular device signature
#[derive(Debug, Clone)]
pub struct ResponseParser {
    signature: String,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(DEVICE_SIGNATURE)
    }
}

impl ResponseParser {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn contains_signature(&self, text: &str) -> bool {
        !self.signature.is_empty() && text.contains(self.signature.as_str())
    }

    pub fn parse_identity(&self, line: &str) -> Option<DeviceIdentity> {
        if self.signature.is_empty() {
            return None;
        }
        let start = line.find(self.signature.as_str())?;
        let token = line[start..].split_whitespace().next()?;
        let mut parts = token.splitn(2, ',');
        let signature = parts.next()?.to_string();
        let version = parts
            .next()
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Some(DeviceIdentity { signature, version })
    }

    /// Classify one line. Status wins over acknowledgements, which win over
    /// identity. Blank lines yield `None`.
    pub fn classify(&self, line: &str) -> Option<Reply> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(status) = parse_status_line(trimmed) {
            return Some(Reply::Status(status));
        }
        match parse_acknowledgement(trimmed) {
            Some(Acknowledgement::Ok(text)) => return Some(Reply::Ok(text)),
            Some(Acknowledgement::Error(text)) => return Some(Reply::Error(text)),
            None => {}
        }
        if let Some(identity) = self.parse_identity(trimmed) {
            return Some(Reply::Identity(identity));
        }
        Some(Reply::Other(trimmed.to_string()))
    }
}
