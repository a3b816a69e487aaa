//! Serial port transport
//!
//! Direct hardware connection to CNC controllers via USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Automatic selection of the first CNC-looking port
//! - Baud rate configuration
//! - A dedicated reader thread forwarding bytes to the read loop

use super::{kind_mismatch, IncomingStream, Transport, TransportEvent, INCOMING_CHANNEL_CAPACITY};
use async_trait::async_trait;
use cnclink_core::{ConnectionConfig, ConnectionError, Error, Result, TransportKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

/// Read timeout; bounds how long the reader thread takes to notice a close
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like CNC controllers
///
/// Filters host ports to:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let mut info = info.with_usb_ids(usb.vid, usb.pid);
                    if let Some(ref mfg) = usb.manufacturer {
                        info = info.with_manufacturer(mfg);
                    }
                    if let Some(ref serial) = usb.serial_number {
                        info = info.with_serial_number(serial);
                    }
                    info
                }
                _ => info,
            }
        })
        .collect())
}

/// Check if a port name matches CNC controller patterns
pub fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Serial transport backed by the `serialport` crate
///
/// The port is opened with a short read timeout; a reader thread polls it and
/// forwards chunks until it is stopped, the port errors, or the read loop
/// drops its receiver.
pub struct SerialTransport {
    port_name: Option<String>,
    writer: Option<Arc<Mutex<Box<dyn serialport::SerialPort>>>>,
    reader: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl SerialTransport {
    /// Create an unopened serial transport
    pub fn new() -> Self {
        Self {
            port_name: None,
            writer: None,
            reader: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name of the open port, if any
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn resolve_port(requested: Option<&str>) -> Result<String> {
        if let Some(port) = requested {
            return Ok(port.to_string());
        }
        let candidate = list_ports()?.into_iter().next().ok_or_else(|| {
            ConnectionError::PortNotFound {
                port: "no CNC-like serial port present".to_string(),
            }
        })?;
        tracing::info!(
            "Auto-selected serial port {} ({})",
            candidate.port_name,
            candidate.description
        );
        Ok(candidate.port_name)
    }

    fn spawn_reader(
        mut port: Box<dyn serialport::SerialPort>,
        tx: mpsc::Sender<TransportEvent>,
        stop: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || {
                let mut buf = [0u8; 1024];
                while !stop.load(Ordering::Acquire) {
                    match port.read(&mut buf) {
                        Ok(0) => continue,
                        Ok(n) => {
                            if tx.blocking_send(TransportEvent::Data(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::TimedOut
                                    | io::ErrorKind::WouldBlock
                                    | io::ErrorKind::Interrupted
                            ) => {}
                        Err(e) => {
                            if !stop.load(Ordering::Acquire) {
                                let _ = tx.blocking_send(TransportEvent::Closed {
                                    reason: e.to_string(),
                                });
                            }
                            break;
                        }
                    }
                }
                tracing::debug!("Serial reader stopped");
            })
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<IncomingStream> {
        let ConnectionConfig::Serial { port, baud_rate } = config else {
            return Err(kind_mismatch(TransportKind::Serial, config).into());
        };
        config.validate()?;
        if self.is_open() {
            self.close().await?;
        }

        let port_name = Self::resolve_port(port.as_deref())?;
        let failed = |reason: String| ConnectionError::FailedToOpen {
            port: port_name.clone(),
            reason,
        };

        let port = serialport::new(&port_name, *baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", port_name, e);
                failed(e.to_string())
            })?;
        let reader_port = port.try_clone().map_err(|e| failed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let reader = Self::spawn_reader(reader_port, tx, stop.clone())
            .map_err(|e| failed(e.to_string()))?;

        tracing::info!("Opened serial port {} at {} baud", port_name, baud_rate);
        self.writer = Some(Arc::new(Mutex::new(port)));
        self.reader = Some(reader);
        self.stop = stop;
        self.port_name = Some(port_name);
        Ok(rx)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let writer = self.writer.clone().ok_or(ConnectionError::NotOpen)?;
        let frame = frame.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut port = writer.lock();
            port.write_all(&frame)?;
            port.flush()
        })
        .await
        .map_err(|e| Error::other(format!("serial write task failed: {}", e)))?
        .map_err(|e| {
            ConnectionError::WriteFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        self.writer = None;
        if let Some(reader) = self.reader.take() {
            // The reader notices the stop flag within one read timeout.
            let _ = tokio::task::spawn_blocking(move || reader.join()).await;
        }
        if let Some(name) = self.port_name.take() {
            tracing::info!("Closed serial port {}", name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        // The detached reader exits within one read timeout and drops its port.
        self.stop.store(true, Ordering::Release);
        if let Some(name) = self.port_name.take() {
            tracing::debug!("Serial port {} released on drop", name);
        }
    }
}
