mod logger;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uartgen_core::protocol::{
    candidate_names, list_ports, Command, CommandBuilder, Discovery, PortInfo, Prober, Reply,
    ResponseParser, SerialOpener, Session, SessionEvent, Settings, SimulatedOpener,
    SimulatorMode, SystemClock, TransportOpener,
};

/// How long the simulated firmware takes to start answering
const DEMO_BOOT_TIME: Duration = Duration::from_millis(1500);

#[derive(Debug, Parser)]
#[command(name = "uartgen", version, about = "Find and control UART-GEN signal generators")]
struct Cli {
    /// JSON settings file (default: <config dir>/uartgen/settings.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the baud rate for probing and sessions
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Use simulated ports SIM0 (generator) and SIM1 (silent) instead of hardware
    #[arg(long, global = true)]
    demo: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// List serial ports
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe every port and report the generators found
    Scan {
        /// Probe all ports at once
        #[arg(long)]
        parallel: bool,
    },
    /// Probe a single port
    Probe {
        port: String,
        /// Capture and show what the port sent
        #[arg(long)]
        diagnose: bool,
    },
    /// Set the output frequency in Hz
    Freq { port: String, hz: i64 },
    /// Set the duty cycle in percent
    Duty { port: String, percent: i64 },
    /// Enable the output
    On { port: String },
    /// Disable the output
    Off { port: String },
    /// Query frequency, duty and output state
    Status { port: String },
    /// Ask the device to identify itself
    Identify { port: String },
    /// Print everything the device sends until it disconnects
    Monitor { port: String },
}

/// Where ports come from: real hardware or the simulator
struct Backend {
    opener: Arc<dyn TransportOpener>,
    demo: Option<Arc<SimulatedOpener>>,
}

impl Backend {
    fn new(demo: bool) -> Self {
        if demo {
            let simulator = Arc::new(
                SimulatedOpener::new(Arc::new(SystemClock), DEMO_BOOT_TIME)
                    .with_device("SIM0", SimulatorMode::Generator)
                    .with_device("SIM1", SimulatorMode::Silent),
            );
            Self {
                opener: simulator.clone(),
                demo: Some(simulator),
            }
        } else {
            Self {
                opener: Arc::new(SerialOpener),
                demo: None,
            }
        }
    }

    fn ports(&self) -> Vec<PortInfo> {
        match &self.demo {
            Some(simulator) => simulator.port_names().into_iter().map(PortInfo::named).collect(),
            None => list_ports(),
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => match default_settings_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!("using settings from {}", path.display());
                Settings::from_file(&path)
                    .with_context(|| format!("failed to load settings from {}", path.display()))?
            }
            None => Settings::default(),
        },
    };
    if let Some(baud) = cli.baud {
        settings.set_baud_rate(baud);
    }
    Ok(settings)
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("uartgen").join("settings.json"))
}

fn prober(settings: &Settings, backend: &Backend) -> Prober {
    Prober::new(
        settings.probe.clone(),
        &settings.device,
        Arc::new(SystemClock),
        backend.opener.clone(),
    )
}

fn describe(reply: &Reply) -> String {
    match reply {
        Reply::Status(status) => format!(
            "status: {} Hz, {}% duty, output {}",
            status.frequency,
            status.duty,
            if status.output_enabled { "on" } else { "off" }
        ),
        Reply::Ok(text) => format!("ok: {}", text),
        Reply::Error(text) => format!("error: {}", text),
        Reply::Identity(identity) => match &identity.version {
            Some(version) => format!("identity: {} {}", identity.signature, version),
            None => format!("identity: {}", identity.signature),
        },
        Reply::Other(text) => text.clone(),
    }
}

fn open_session(settings: &Settings, backend: &Backend, port: &str) -> Result<Session> {
    let session = Session::open(backend.opener.as_ref(), port, &settings.session)
        .with_context(|| format!("failed to open {}", port))?
        .with_parser(ResponseParser::new(settings.device.signature.clone()));

    // Opening the port resets the board; let it boot and swallow the banner
    let banner = session
        .collect_replies(settings.probe.boot_delay())
        .with_context(|| format!("{} went away while booting", port))?;
    for reply in &banner {
        tracing::debug!("boot: {}", describe(reply));
    }
    Ok(session)
}

fn send_one(settings: &Settings, backend: &Backend, port: &str, command: Command) -> Result<()> {
    let mut session = open_session(settings, backend, port)?;
    session
        .send(&command)
        .with_context(|| format!("failed to send {} to {}", command, port))?;

    let replies = session
        .collect_replies(settings.session.reply_window())
        .with_context(|| format!("lost {} while waiting for a reply", port))?;
    if replies.is_empty() {
        bail!("no reply from {} to {}", port, command);
    }
    for reply in &replies {
        println!("{}", describe(reply));
    }
    session.close();

    if replies.iter().any(|r| matches!(r, Reply::Error(_))) {
        bail!("{} rejected {}", port, command);
    }
    Ok(())
}

fn print_ports(ports: &[PortInfo], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(ports)?);
    } else if ports.is_empty() {
        println!("no serial ports found");
    } else {
        for port in ports {
            println!("{}", port);
        }
    }
    Ok(())
}

fn scan(settings: &Settings, backend: &Backend, parallel: bool) -> Result<()> {
    let candidates = candidate_names(&backend.ports());
    if candidates.is_empty() {
        println!("no serial ports found");
        return Ok(());
    }
    tracing::info!("probing {} port(s)", candidates.len());

    let discovery = Discovery::new(prober(settings, backend));
    if parallel {
        let found = discovery.scan_parallel(&candidates);
        if found.is_empty() {
            println!("no generator found on {}", candidates.join(", "));
        }
        for port in found {
            println!("{}", port);
        }
        return Ok(());
    }

    let report = discovery.discover(&candidates);
    for port in &report.found {
        println!("{}", port);
    }
    if let Some(diagnostic) = report.diagnostic {
        println!("no generator found on {}", report.candidates.join(", "));
        println!("{}", diagnostic);
    }
    Ok(())
}

fn probe(settings: &Settings, backend: &Backend, port: &str, diagnose: bool) -> Result<()> {
    let prober = prober(settings, backend);
    if diagnose {
        let report = prober.probe_with_diagnostics(port);
        println!("{}", report);
        if let Some(fault) = report.fault {
            bail!("probe of {} failed: {}", port, fault);
        }
        return Ok(());
    }
    if prober.probe(port) {
        println!("{}: generator found", port);
        Ok(())
    } else {
        bail!("{}: no generator answered", port)
    }
}

fn monitor(settings: &Settings, backend: &Backend, port: &str) -> Result<()> {
    let session = open_session(settings, backend, port)?;
    tracing::info!("monitoring {}", port);
    let parser = ResponseParser::new(settings.device.signature.clone());
    loop {
        match session.recv_timeout(settings.session.reply_window()) {
            Some(SessionEvent::Line(line)) => {
                if let Some(reply) = parser.classify(&line) {
                    println!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), describe(&reply));
                }
            }
            Some(SessionEvent::Disconnected(reason)) => bail!("{} disconnected: {}", port, reason),
            None => {}
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let backend = Backend::new(cli.demo);
    let builder = CommandBuilder::new(settings.device.clone());

    match &cli.command {
        Cmd::Ports { json } => print_ports(&backend.ports(), *json),
        Cmd::Scan { parallel } => scan(&settings, &backend, *parallel),
        Cmd::Probe { port, diagnose } => probe(&settings, &backend, port, *diagnose),
        Cmd::Freq { port, hz } => send_one(&settings, &backend, port, builder.frequency(*hz)?),
        Cmd::Duty { port, percent } => {
            send_one(&settings, &backend, port, builder.duty(*percent)?)
        }
        Cmd::On { port } => send_one(&settings, &backend, port, builder.on()),
        Cmd::Off { port } => send_one(&settings, &backend, port, builder.off()),
        Cmd::Status { port } => send_one(&settings, &backend, port, builder.status_query()),
        Cmd::Identify { port } => send_one(&settings, &backend, port, builder.identity_query()),
        Cmd::Monitor { port } => monitor(&settings, &backend, port),
    }
}

fn main() {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);
    tracing::debug!("CLI args: {:?}", cli);

    if let Err(e) = run(&cli) {
        tracing::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
