//! Simulated generator
//!
//! An in-process stand-in for the firmware, good enough to drive the prober
//! and a control session without hardware. Time comes from a [`Clock`], so a
//! [`ManualClock`](super::ManualClock) makes the boot delay and read timeouts
//! free in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{Clock, OpenSettings, ProtocolError, Transport, TransportOpener};

const FIRMWARE_ID: &str = "UART-GEN";
const FIRMWARE_VERSION: &str = "1.0";
const BOOT_BANNER: &str = "\r\nUART Generator (Arduino). Commands: FREQ, DUTY, ON, OFF, VER?\r\n";
const LINE_MAX: usize = 64;
const FREQ_MIN: u64 = 1;
const FREQ_MAX: u64 = 40_000_000;
const NOISE_CHUNK: usize = 64;
/// One 8N1 character at 115200 baud
const BYTE_TIME: Duration = Duration::from_micros(87);

/// How a simulated port behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorMode {
    /// Boots, then answers like the firmware
    Generator,
    /// Accepts writes, never sends anything
    Silent,
    /// Sends random printable garbage forever and ignores commands
    Noisy { seed: u64 },
}

#[derive(Debug)]
struct DeviceState {
    mode: SimulatorMode,
    frequency: u32,
    duty: u32,
    running: bool,
    boot_time: Duration,
    booted_at: Instant,
    line: String,
    tx: VecDeque<u8>,
    received: Vec<String>,
    control_lines: Option<(bool, bool)>,
    open_handles: usize,
    unplugged: bool,
    rng: StdRng,
}

impl DeviceState {
    fn new(mode: SimulatorMode, boot_time: Duration, now: Instant) -> Self {
        let seed = match mode {
            SimulatorMode::Noisy { seed } => seed,
            _ => 0,
        };
        Self {
            mode,
            frequency: 1000,
            duty: 50,
            running: false,
            boot_time,
            booted_at: now,
            line: String::new(),
            tx: VecDeque::new(),
            received: Vec::new(),
            control_lines: None,
            open_handles: 0,
            unplugged: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn power_on(&mut self, now: Instant) {
        self.booted_at = now + self.boot_time;
        self.line.clear();
        self.tx.clear();
        if self.mode == SimulatorMode::Generator {
            self.send(BOOT_BANNER);
        }
    }

    fn send(&mut self, text: &str) {
        self.tx.extend(text.as_bytes());
    }

    fn feed(&mut self, bytes: &[u8], now: Instant) {
        for &b in bytes {
            let c = b as char;
            if c == '\n' || c == '\r' || self.line.len() >= LINE_MAX - 1 {
                let line = std::mem::take(&mut self.line);
                if !line.is_empty() {
                    self.process_line(&line, now);
                }
                if c != '\n' && c != '\r' {
                    self.line.push(c);
                }
            } else {
                self.line.push(c);
            }
        }
    }

    fn process_line(&mut self, raw: &str, now: Instant) {
        let line = raw.trim_start_matches(' ');
        if line.is_empty() {
            return;
        }
        self.received.push(line.to_string());

        // Still in setup(): the UART is not serviced yet
        if now < self.booted_at || self.mode != SimulatorMode::Generator {
            return;
        }

        match line {
            "VER?" | "ID?" => {
                let reply = format!("{},{}\r\n", FIRMWARE_ID, FIRMWARE_VERSION);
                self.send(&reply);
            }
            "?" | "STATUS" => {
                let reply = format!(
                    "FREQ={} DUTY={} {}\r\n",
                    self.frequency,
                    self.duty,
                    if self.running { "ON" } else { "OFF" }
                );
                self.send(&reply);
            }
            "ON" | "START" => {
                self.running = true;
                self.send("OK ON\r\n");
            }
            "OFF" | "STOP" => {
                self.running = false;
                self.send("OK OFF\r\n");
            }
            "HELP" => self.send(
                "VER?|ID?    - identify (UART-GEN,version)\r\n\
                 FREQ <Hz>   - frequency 1..40000000\r\n\
                 DUTY <0-100> - duty cycle %\r\n\
                 ON|START    - enable output\r\n\
                 OFF|STOP    - disable output\r\n\
                 ?|STATUS    - status\r\n\
                 HELP        - this help\r\n",
            ),
            _ => {
                if let Some(arg) = line.strip_prefix("FREQ ") {
                    let value = leading_number(arg);
                    if !(FREQ_MIN..=FREQ_MAX).contains(&value) {
                        self.send("ERR FREQ range 1..40000000\r\n");
                    } else {
                        self.frequency = value as u32;
                        let reply = format!("OK FREQ {}\r\n", value);
                        self.send(&reply);
                    }
                } else if let Some(arg) = line.strip_prefix("DUTY ") {
                    let value = leading_number(arg);
                    if value > 100 {
                        self.send("ERR DUTY 0..100\r\n");
                    } else {
                        self.duty = value as u32;
                        let reply = format!("OK DUTY {}\r\n", value);
                        self.send(&reply);
                    }
                } else {
                    self.send("ERR unknown command (HELP)\r\n");
                }
            }
        }
    }
}

/// Parse leading decimal digits the way `strtoul` does; no digits reads as 0
fn leading_number(text: &str) -> u64 {
    text.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .try_fold(0u64, |acc, c| {
            acc.checked_mul(10)?.checked_add(u64::from(c as u8 - b'0'))
        })
        .unwrap_or(u64::MAX)
}

fn lock(state: &Mutex<DeviceState>) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// One open handle to a simulated device
pub struct SimulatedGenerator {
    state: Arc<Mutex<DeviceState>>,
    clock: Arc<dyn Clock>,
    read_timeout: Duration,
}

impl SimulatedGenerator {
    fn attach(state: Arc<Mutex<DeviceState>>, clock: Arc<dyn Clock>, read_timeout: Duration) -> Self {
        lock(&state).open_handles += 1;
        Self {
            state,
            clock,
            read_timeout,
        }
    }
}

impl Drop for SimulatedGenerator {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

fn unplugged_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged")
}

impl Read for SimulatedGenerator {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let noise = {
            let mut state = lock(&self.state);
            if state.unplugged {
                return Err(unplugged_error());
            }
            if let SimulatorMode::Noisy { .. } = state.mode {
                let n = buf.len().min(NOISE_CHUNK);
                for slot in buf.iter_mut().take(n) {
                    *slot = state.rng.gen_range(b' '..=b'~');
                }
                Some(n)
            } else if !state.tx.is_empty() {
                let n = buf.len().min(state.tx.len());
                for (slot, byte) in buf.iter_mut().zip(state.tx.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            } else {
                None
            }
        };
        if let Some(n) = noise {
            // Garbage still takes line time to arrive
            self.clock.sleep(BYTE_TIME * n as u32);
            return Ok(n);
        }
        // Nothing pending: behave like a serial read running into its timeout
        self.clock.sleep(self.read_timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"))
    }
}

impl Write for SimulatedGenerator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.unplugged {
            return Err(unplugged_error());
        }
        state.feed(buf, now);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for SimulatedGenerator {
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> io::Result<()> {
        lock(&self.state).control_lines = Some((dtr, rts));
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        lock(&self.state).tx.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(SimulatedGenerator::attach(
            self.state.clone(),
            self.clock.clone(),
            self.read_timeout,
        )))
    }
}

/// Opener that serves simulated devices by port name.
///
/// Unknown names fail to open, like a missing serial port.
pub struct SimulatedOpener {
    clock: Arc<dyn Clock>,
    boot_time: Duration,
    devices: Mutex<HashMap<String, Arc<Mutex<DeviceState>>>>,
}

impl SimulatedOpener {
    /// `boot_time` is how long after open the firmware starts answering
    pub fn new(clock: Arc<dyn Clock>, boot_time: Duration) -> Self {
        Self {
            clock,
            boot_time,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Register a port
    pub fn with_device(self, port: impl Into<String>, mode: SimulatorMode) -> Self {
        let state = DeviceState::new(mode, self.boot_time, self.clock.now());
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(port.into(), Arc::new(Mutex::new(state)));
        self
    }

    fn device(&self, port: &str) -> Option<Arc<Mutex<DeviceState>>> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(port)
            .cloned()
    }

    /// Registered port names, sorted
    pub fn port_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Command lines the device has seen, including those sent while booting
    pub fn received_lines(&self, port: &str) -> Vec<String> {
        self.device(port)
            .map(|d| lock(&d).received.clone())
            .unwrap_or_default()
    }

    /// Handles currently open on `port`
    pub fn open_handles(&self, port: &str) -> usize {
        self.device(port).map(|d| lock(&d).open_handles).unwrap_or(0)
    }

    /// Last (DTR, RTS) levels set on `port`
    pub fn control_lines(&self, port: &str) -> Option<(bool, bool)> {
        self.device(port).and_then(|d| lock(&d).control_lines)
    }

    /// Make every handle on `port` fail, as if the cable was pulled
    pub fn unplug(&self, port: &str) {
        if let Some(device) = self.device(port) {
            lock(&device).unplugged = true;
        }
    }
}

impl TransportOpener for SimulatedOpener {
    fn open(&self, port: &str, settings: &OpenSettings) -> Result<Box<dyn Transport>, ProtocolError> {
        let device = self
            .device(port)
            .ok_or_else(|| ProtocolError::PortNotFound(port.to_string()))?;
        {
            let mut state = lock(&device);
            if state.unplugged {
                return Err(ProtocolError::PortNotFound(port.to_string()));
            }
            state.power_on(self.clock.now());
        }
        Ok(Box::new(SimulatedGenerator::attach(
            device,
            self.clock.clone(),
            settings.read_timeout,
        )))
    }
}
