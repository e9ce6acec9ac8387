//! Serial port handling
//!
//! Port enumeration and low-level open for the generator's USB-CDC link.

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
use std::fmt;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use tracing::debug;

use super::ProtocolError;

/// A candidate endpoint found during enumeration. Never cached between scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    pub manufacturer: Option<String>,

    pub product: Option<String>,

    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Port known only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    pub fn is_usb(&self) -> bool {
        self.vid.is_some()
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => Self::named(info.port_name),
        }
    }
}

/// Sort key: ttyACM* first (ESP32 USB-CDC), then ttyUSB* (bridges), then the rest.
/// Numbered ports sort numerically.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyACM"), (1u8, "ttyUSB")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// Sort candidates in probe order
pub fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by_key(|p| port_sort_key(&p.name));
}

/// List serial ports, with Linux /dev fallbacks, in probe order
pub fn list_ports() -> Vec<PortInfo> {
    let mut by_name: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(found) => {
            for info in found {
                let port = PortInfo::from(info);
                by_name.entry(port.name.clone()).or_insert(port);
            }
        }
        Err(e) => debug!("serial port enumeration failed: {}", e),
    }

    // udev-less containers hide CDC devices from the enumeration API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    by_name
                        .entry(full.clone())
                        .or_insert_with(|| PortInfo::named(full));
                }
            }
        }
    }

    let mut ports: Vec<PortInfo> = by_name.into_values().collect();
    sort_ports(&mut ports);
    debug!("enumerated {} serial ports", ports.len());
    ports
}

/// Open a port at `baud_rate`, 8N1, no flow control
pub fn open_port(
    name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::PortNotFound(String::new()));
    }
    let port = serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()?;
    debug!("opened {} at {} baud", name, baud_rate);
    Ok(port)
}
