//! Control session
//!
//! An open connection to one generator. Commands are written from the
//! caller's thread; a dedicated reader thread splits the incoming stream into
//! lines and hands them over an mpsc channel, so the caller drains replies on
//! its own schedule and no parser state is shared between threads.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    Command, OpenSettings, ProtocolError, Reply, ResponseParser, SessionConfig, Transport,
    TransportOpener,
};

/// Longest partial line held while waiting for a delimiter
const MAX_PENDING: usize = 64 * 1024;
const READ_CHUNK: usize = 256;

/// What the reader thread reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One trimmed, non-empty line
    Line(String),
    /// The transport failed; no further events follow
    Disconnected(String),
}

/// Incremental splitter for a `\n`/`\r` delimited byte stream
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, get back every line they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' || b == b'\r' {
                self.flush_into(&mut lines);
            } else {
                self.pending.push(b);
                if self.pending.len() >= MAX_PENDING {
                    self.flush_into(&mut lines);
                }
            }
        }
        lines
    }

    /// Bytes held for an unfinished line
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        let line: String = self
            .pending
            .drain(..)
            .map(|b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
            .collect();
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
}

/// Open control connection with its reader thread
pub struct Session {
    port: String,
    writer: Box<dyn Transport>,
    events: Receiver<SessionEvent>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    parser: ResponseParser,
}

impl Session {
    /// Open `port` and start reading
    pub fn open(
        opener: &dyn TransportOpener,
        port: &str,
        config: &SessionConfig,
    ) -> Result<Self, ProtocolError> {
        let settings = OpenSettings {
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        };
        let transport = opener.open(port, &settings)?;
        let session = Self::with_transport(port, transport)?;
        info!("session open on {} @ {}", port, config.baud_rate);
        Ok(session)
    }

    /// Wrap an already open transport
    pub fn with_transport(port: &str, transport: Box<dyn Transport>) -> Result<Self, ProtocolError> {
        let reader_port = transport.try_clone()?;
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let reader = {
            let stop = stop.clone();
            let name = port.to_string();
            std::thread::Builder::new()
                .name(format!("uartgen-reader-{}", port))
                .spawn(move || read_loop(&name, reader_port, tx, stop))?
        };

        Ok(Self {
            port: port.to_string(),
            writer: transport,
            events: rx,
            stop,
            reader: Some(reader),
            parser: ResponseParser::default(),
        })
    }

    /// Classify replies against a non-default signature
    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Write one command line
    pub fn send(&mut self, command: &Command) -> Result<(), ProtocolError> {
        self.writer.write_all(&command.to_bytes())?;
        self.writer.flush()?;
        debug!("→ {}", command);
        Ok(())
    }

    /// Next event, if one is already queued
    pub fn try_recv(&self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Everything queued right now
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    /// Queued lines, classified; disconnect events are skipped
    pub fn drain_replies(&self) -> Vec<Reply> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Line(line) => self.parser.classify(&line),
                SessionEvent::Disconnected(_) => None,
            })
            .collect()
    }

    /// Collect classified replies until `window` has passed.
    ///
    /// Fails with [`ProtocolError::Disconnected`] if the reader reports a
    /// transport fault inside the window.
    pub fn collect_replies(&self, window: Duration) -> Result<Vec<Reply>, ProtocolError> {
        let deadline = Instant::now() + window;
        let mut replies = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(SessionEvent::Line(line)) => replies.extend(self.parser.classify(&line)),
                Ok(SessionEvent::Disconnected(reason)) => {
                    return Err(ProtocolError::Disconnected(reason))
                }
                Err(RecvTimeoutError::Timeout) => return Ok(replies),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ProtocolError::Disconnected("reader stopped".to_string()))
                }
            }
        }
    }

    /// Stop the reader and release the port
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("reader thread for {} panicked", self.port);
            }
            info!("session on {} closed", self.port);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reader thread body. The transport's read timeout bounds how long a stop
/// request goes unnoticed.
fn read_loop(
    port: &str,
    mut transport: Box<dyn Transport>,
    tx: Sender<SessionEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut splitter = LineSplitter::new();
    let mut chunk = [0u8; READ_CHUNK];

    while !stop.load(Ordering::Relaxed) {
        match transport.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => {
                for line in splitter.push(&chunk[..n]) {
                    debug!("← {}", line);
                    if tx.send(SessionEvent::Line(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!("lost connection to {}: {}", port, e);
                let _ = tx.send(SessionEvent::Disconnected(e.to_string()));
                return;
            }
        }
    }
}
