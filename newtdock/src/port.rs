//! Serial port access for the docking link.
//!
//! Docking cables run 8N1 without flow control; 38400 baud is what the
//! devices default to.

use std::time::Duration;

#[cfg(feature = "native")]
use {
    crate::error::Result,
    log::{debug, trace},
    serialport::{DataBits, FlowControl, Parity, SerialPortType, StopBits},
};

/// Default docking baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout; reads that time out are retried by the link pump.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Information about an available port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// Port kind ("usb", "pci", "bluetooth" or "unknown").
    pub kind: String,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
}

/// Open a serial port for docking.
#[cfg(feature = "native")]
pub fn open_serial(config: &SerialConfig) -> Result<Box<dyn serialport::SerialPort>> {
    debug!(
        "Opening {} at {} baud",
        config.port_name, config.baud_rate
    );
    let port = serialport::new(&config.port_name, config.baud_rate)
        .timeout(config.timeout)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open()?;
    Ok(port)
}

/// List available serial ports.
#[cfg(feature = "native")]
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    trace!("Found {} serial ports", ports.len());

    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                name: p.port_name,
                kind: "usb".into(),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            other => PortInfo {
                name: p.port_name,
                kind: match other {
                    SerialPortType::PciPort => "pci",
                    SerialPortType::BluetoothPort => "bluetooth",
                    _ => "unknown",
                }
                .into(),
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect())
}
