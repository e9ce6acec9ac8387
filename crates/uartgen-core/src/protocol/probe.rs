//! Port probing
//!
//! Decides whether a generator is attached to one candidate port. A probe
//! opens the port, lets the firmware boot, sends `VER?` twice and watches the
//! input for the device signature until the deadline passes.
//!
//! Probing is speculative, so [`Prober::probe`] never fails: busy ports,
//! missing permissions and devices pulled mid-probe all read as "not found".

use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    build_identity_query_command, Clock, Command, DeviceProfile, OpenSettings, ProbeConfig,
    ProtocolError, ResponseParser, SerialOpener, SystemClock, Transport, TransportOpener,
};

const READ_CHUNK: usize = 512;

/// Outcome of a diagnostic probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub port: String,
    /// Whether the captured text contained the signature
    pub found: bool,
    /// Start of the captured text, escaped so control bytes stay visible
    pub preview: String,
    /// Transport fault that ended the probe, if any
    pub fault: Option<String>,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fault {
            Some(fault) => write!(f, "{}: error: {}", self.port, fault),
            None => write!(
                f,
                "{}: {} {}",
                self.port,
                if self.found { "generator" } else { "no generator" },
                self.preview
            ),
        }
    }
}

/// Probes candidate ports for a compliant generator
pub struct Prober {
    config: ProbeConfig,
    parser: ResponseParser,
    identify: Command,
    clock: Arc<dyn Clock>,
    opener: Arc<dyn TransportOpener>,
}

impl Prober {
    pub fn new(
        config: ProbeConfig,
        profile: &DeviceProfile,
        clock: Arc<dyn Clock>,
        opener: Arc<dyn TransportOpener>,
    ) -> Self {
        Self {
            config,
            parser: ResponseParser::new(profile.signature.clone()),
            identify: build_identity_query_command(),
            clock,
            opener,
        }
    }

    /// Prober over real serial ports and wall-clock time
    pub fn serial(config: ProbeConfig, profile: &DeviceProfile) -> Self {
        Self::new(config, profile, Arc::new(SystemClock), Arc::new(SerialOpener))
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// True if a generator answered on `port` before the deadline
    pub fn probe(&self, port: &str) -> bool {
        let _span = tracing::debug_span!("probe", port = %port).entered();
        match self.run(port, Listen::UntilSignature) {
            Ok(capture) => {
                if capture.found {
                    info!("generator found on {}", port);
                } else {
                    debug!("no signature on {} before deadline", port);
                }
                capture.found
            }
            Err(e) => {
                debug!("probe of {} failed: {}", port, e);
                false
            }
        }
    }

    /// Same handshake as [`probe`](Self::probe), but listens for the whole
    /// diagnostic window and reports what came back
    pub fn probe_with_diagnostics(&self, port: &str) -> ProbeReport {
        let _span = tracing::debug_span!("probe_diagnostics", port = %port).entered();
        match self.run(port, Listen::Window) {
            Ok(capture) => ProbeReport {
                port: port.to_string(),
                found: capture.found,
                preview: preview(&capture.text, self.config.preview_chars),
                fault: None,
            },
            Err(e) => {
                warn!("diagnostic probe of {} failed: {}", port, e);
                ProbeReport {
                    port: port.to_string(),
                    found: false,
                    preview: String::new(),
                    fault: Some(e.to_string()),
                }
            }
        }
    }

    /// Open, handshake and listen. The transport is dropped (and the port
    /// released) on every return path.
    fn run(&self, port: &str, listen: Listen) -> Result<Capture, ProtocolError> {
        let opened_at = self.clock.now();
        let deadline = opened_at + self.config.total_timeout();
        let settings = OpenSettings {
            baud_rate: self.config.baud_rate,
            read_timeout: self.config.read_timeout(),
            write_timeout: self.config.write_timeout(),
        };
        let mut transport = self.opener.open(port, &settings)?;

        self.handshake(transport.as_mut(), deadline)?;

        let until = match listen {
            Listen::UntilSignature => deadline,
            Listen::Window => self.clock.now() + self.config.diagnostic_window(),
        };
        self.accumulate(transport.as_mut(), until, listen == Listen::UntilSignature)
    }

    fn handshake(&self, transport: &mut dyn Transport, deadline: Instant) -> Result<(), ProtocolError> {
        // Some adapters reset the board on DTR/RTS edges; keep both low
        if let Err(e) = transport.set_control_lines(false, false) {
            debug!("could not de-assert DTR/RTS: {} (continuing)", e);
        }

        let boot = self
            .config
            .boot_delay()
            .min(deadline.saturating_duration_since(self.clock.now()));
        debug!("waiting {}ms for firmware boot", boot.as_millis());
        self.clock.sleep(boot);

        transport.clear_input()?;

        let bytes = self.identify.to_bytes();
        transport.write_all(&bytes)?;
        transport.flush()?;
        self.clock.sleep(self.config.retry_gap());
        transport.write_all(&bytes)?;
        transport.flush()?;
        debug!("sent {} twice", self.identify);
        Ok(())
    }

    fn accumulate(
        &self,
        transport: &mut dyn Transport,
        until: Instant,
        stop_on_signature: bool,
    ) -> Result<Capture, ProtocolError> {
        // Signature search runs over a rolling tail; the diagnostic preview
        // comes from a separate copy of the head
        let mut tail = String::new();
        let mut head = String::new();
        let head_limit = self.config.buffer_cap.max(self.config.preview_chars);
        let mut found = false;
        let mut chunk = [0u8; READ_CHUNK];

        while self.clock.now() < until {
            match transport.read(&mut chunk) {
                Ok(0) => self.clock.sleep(self.config.idle_poll()),
                Ok(n) => {
                    let text = decode_ascii(&chunk[..n]);
                    if !stop_on_signature && head.len() < head_limit {
                        head.push_str(&text);
                        truncate_head(&mut head, head_limit);
                    }
                    tail.push_str(&text);
                    found = found || self.parser.contains_signature(&tail);
                    if found && stop_on_signature {
                        break;
                    }
                    trim_buffer(&mut tail, self.config.buffer_cap, self.config.buffer_keep);
                }
                Err(e) if is_idle(e.kind()) => self.clock.sleep(self.config.idle_poll()),
                Err(e) => return Err(e.into()),
            }
        }

        let text = if stop_on_signature { tail } else { head };
        Ok(Capture { found, text })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listen {
    UntilSignature,
    Window,
}

struct Capture {
    found: bool,
    text: String,
}

fn is_idle(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// ASCII decode; anything outside 7-bit becomes U+FFFD
fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect()
}

/// Once `text` grows past `cap` bytes keep only the last `keep`
fn trim_buffer(text: &mut String, cap: usize, keep: usize) {
    if text.len() <= cap {
        return;
    }
    let mut cut = text.len().saturating_sub(keep);
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.drain(..cut);
}

fn truncate_head(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// First `chars` characters, Debug-quoted
fn preview(text: &str, chars: usize) -> String {
    let head: String = text.chars().take(chars).collect();
    format!("{:?}", head)
}
