use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use uartgen_core::protocol::{
    Clock, DeviceProfile, ManualClock, OpenSettings, ProbeConfig, Prober, ProtocolError,
    SimulatedOpener, SimulatorMode, Transport, TransportOpener,
};

/// Replays the same read chunks after every open, then goes quiet
struct ScriptedOpener {
    clock: Arc<ManualClock>,
    chunks: Vec<Vec<u8>>,
}

struct ScriptedPort {
    clock: Arc<ManualClock>,
    chunks: VecDeque<Vec<u8>>,
    read_timeout: Duration,
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => {
                self.clock.sleep(self.read_timeout);
                Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"))
            }
        }
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedPort {
    fn set_control_lines(&mut self, _dtr: bool, _rts: bool) -> io::Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "scripted port"))
    }
}

impl TransportOpener for ScriptedOpener {
    fn open(&self, _port: &str, settings: &OpenSettings) -> Result<Box<dyn Transport>, ProtocolError> {
        Ok(Box::new(ScriptedPort {
            clock: self.clock.clone(),
            chunks: self.chunks.iter().cloned().collect(),
            read_timeout: settings.read_timeout,
        }))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uartgen_core=debug")
        .with_test_writer()
        .try_init();
}

fn prober_with(
    clock: &Arc<ManualClock>,
    opener: &Arc<SimulatedOpener>,
    config: ProbeConfig,
) -> Prober {
    Prober::new(config, &DeviceProfile::default(), clock.clone(), opener.clone())
}

fn simulated(boot_time: Duration, mode: SimulatorMode) -> (Arc<ManualClock>, Arc<SimulatedOpener>) {
    let clock = Arc::new(ManualClock::new());
    let opener = Arc::new(SimulatedOpener::new(clock.clone(), boot_time).with_device("SIM0", mode));
    (clock, opener)
}

#[test]
fn test_generator_found_before_deadline() {
    let config = ProbeConfig::default();
    let (clock, opener) = simulated(config.boot_delay(), SimulatorMode::Generator);
    let prober = prober_with(&clock, &opener, config.clone());

    init_tracing();
    assert!(prober.probe("SIM0"));
    assert!(clock.elapsed() < config.total_timeout());
    assert!(clock.elapsed() >= config.boot_delay());
}

#[test]
fn test_second_query_covers_slow_boot() {
    // First VER? lands while the firmware is still booting, the second does not
    let config = ProbeConfig::default();
    let (clock, opener) = simulated(Duration::from_millis(2600), SimulatorMode::Generator);
    let prober = prober_with(&clock, &opener, config);

    assert!(prober.probe("SIM0"));
}

#[test]
fn test_device_booting_through_both_queries_is_not_found() {
    let (clock, opener) = simulated(Duration::from_secs(3), SimulatorMode::Generator);
    let prober = prober_with(&clock, &opener, ProbeConfig::default());

    assert!(!prober.probe("SIM0"));
}

#[test]
fn test_silent_port_times_out() {
    let config = ProbeConfig::default();
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Silent);
    let prober = prober_with(&clock, &opener, config.clone());

    assert!(!prober.probe("SIM0"));

    let slack = config.read_timeout() + config.idle_poll();
    assert!(clock.elapsed() >= config.total_timeout());
    assert!(clock.elapsed() <= config.total_timeout() + slack);
    assert_eq!(opener.received_lines("SIM0"), vec!["VER?", "VER?"]);
}

#[test]
fn test_noisy_port_is_not_found() {
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Noisy { seed: 42 });
    // Noise arrives instantly; keep the virtual budget small so the loop ends quickly
    let config = ProbeConfig {
        boot_delay_ms: 100,
        total_timeout_ms: 400,
        ..ProbeConfig::default()
    };
    let prober = prober_with(&clock, &opener, config);

    assert!(!prober.probe("SIM0"));
}

#[test]
fn test_control_lines_deasserted_and_port_released() {
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Generator);
    let prober = prober_with(&clock, &opener, ProbeConfig::default());

    assert!(prober.probe("SIM0"));
    assert_eq!(opener.control_lines("SIM0"), Some((false, false)));
    assert_eq!(opener.open_handles("SIM0"), 0);

    assert!(!prober.probe("SIM9"));
    assert_eq!(opener.open_handles("SIM0"), 0);
}

#[test]
fn test_short_deadline_clamps_boot_delay() {
    let (clock, opener) = simulated(Duration::from_millis(2500), SimulatorMode::Generator);
    let config = ProbeConfig::default().with_total_timeout(Duration::from_secs(1));
    let prober = prober_with(&clock, &opener, config.clone());

    assert!(!prober.probe("SIM0"));
    assert!(clock.elapsed() < config.total_timeout() + Duration::from_millis(500));
}

#[test]
fn test_unopenable_port_returns_false_quickly() {
    let config = ProbeConfig::default().with_total_timeout(Duration::from_millis(100));
    let prober = Prober::serial(config, &DeviceProfile::default());

    let start = Instant::now();
    assert!(!prober.probe("COM__NO_SUCH_PORT__"));
    assert!(!prober.probe(""));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_custom_signature() {
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Generator);
    let profile = DeviceProfile {
        signature: "PWM-BOX".to_string(),
        ..DeviceProfile::default()
    };
    let prober = Prober::new(ProbeConfig::default(), &profile, clock, opener);

    assert!(!prober.probe("SIM0"));
}

#[test]
fn test_diagnostics_capture_reply() {
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Generator);
    let prober = prober_with(&clock, &opener, ProbeConfig::default());

    init_tracing();
    let report = prober.probe_with_diagnostics("SIM0");
    assert!(report.found);
    assert!(report.fault.is_none());
    assert!(report.preview.contains("UART-GEN,1.0\\r\\n"));
    assert_eq!(opener.open_handles("SIM0"), 0);
}

#[test]
fn test_diagnostics_preview_is_bounded() {
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Noisy { seed: 1 });
    let config = ProbeConfig {
        boot_delay_ms: 10,
        diagnostic_window_ms: 50,
        preview_chars: 40,
        ..ProbeConfig::default()
    };
    let prober = prober_with(&clock, &opener, config);

    let report = prober.probe_with_diagnostics("SIM0");
    assert!(!report.found);
    // 40 chars plus quotes and any escapes
    assert!(report.preview.chars().count() <= 2 + 40 * 2);
}

#[test]
fn test_diagnostics_report_fault() {
    let (clock, opener) = simulated(Duration::ZERO, SimulatorMode::Generator);
    let prober = prober_with(&clock, &opener, ProbeConfig::default());

    let report = prober.probe_with_diagnostics("NOPE");
    assert!(!report.found);
    assert_eq!(report.preview, "");
    assert!(report.fault.unwrap().contains("NOPE"));
}

#[test]
fn test_signature_split_across_reads_after_noise() {
    let clock = Arc::new(ManualClock::new());
    let mut chunks = vec![vec![b'x'; 512]; 4];
    chunks.push(b"UA".to_vec());
    chunks.push(b"RT-GEN,1.0\r\n".to_vec());
    let opener = Arc::new(ScriptedOpener {
        clock: clock.clone(),
        chunks,
    });
    let prober = Prober::new(
        ProbeConfig::default(),
        &DeviceProfile::default(),
        clock,
        opener,
    );

    assert!(prober.probe("SCRIPTED"));
    let report = prober.probe_with_diagnostics("SCRIPTED");
    assert!(report.found);
    assert!(report.fault.is_none());
    assert!(report.preview.starts_with("\"xxxx"));
}
