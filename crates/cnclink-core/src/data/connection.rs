//! Connection configuration
//!
//! One variant per transport kind. A config is fixed once a connection
//! attempt starts.

use super::TransportKind;
use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default serial baud rate for GRBL controllers
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default time spent scanning for a BLE device
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 10_000;

/// Parameters for opening a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Point-to-point serial link
    Serial {
        /// Port name (e.g. "/dev/ttyUSB0", "COM3"); `None` picks the first
        /// port that looks like a CNC controller
        port: Option<String>,
        /// Baud rate
        baud_rate: u32,
    },
    /// Bluetooth LE link over the Nordic UART Service
    Gatt {
        /// Only accept a device whose advertised name contains this string
        device_name: Option<String>,
        /// How long to scan before giving up
        scan_timeout_ms: u64,
    },
    /// WebSocket client connection
    WebSocket {
        /// Endpoint URL (`ws://` or `wss://`)
        url: String,
    },
}

impl ConnectionConfig {
    /// Serial config on an explicit port at the default baud rate
    pub fn serial(port: impl Into<String>) -> Self {
        Self::Serial {
            port: Some(port.into()),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Serial config that picks the first CNC-looking port
    pub fn serial_auto(baud_rate: u32) -> Self {
        Self::Serial {
            port: None,
            baud_rate,
        }
    }

    /// WebSocket config for the given endpoint
    pub fn websocket(url: impl Into<String>) -> Self {
        Self::WebSocket { url: url.into() }
    }

    /// GATT config with an optional name filter and the default scan timeout
    pub fn gatt(device_name: Option<String>) -> Self {
        Self::Gatt {
            device_name,
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
        }
    }

    /// The transport kind this config selects
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Serial { .. } => TransportKind::Serial,
            Self::Gatt { .. } => TransportKind::Gatt,
            Self::WebSocket { .. } => TransportKind::WebSocket,
        }
    }

    /// Reject parameters no transport could open
    pub fn validate(&self) -> Result<(), ConnectionError> {
        match self {
            Self::Serial { port, baud_rate } => {
                if *baud_rate == 0 {
                    return Err(ConnectionError::InvalidParameters {
                        reason: "baud rate must be > 0".to_string(),
                    });
                }
                if port.as_deref().is_some_and(|p| p.trim().is_empty()) {
                    return Err(ConnectionError::InvalidParameters {
                        reason: "serial port name is empty".to_string(),
                    });
                }
            }
            Self::Gatt {
                scan_timeout_ms, ..
            } => {
                if *scan_timeout_ms == 0 {
                    return Err(ConnectionError::InvalidParameters {
                        reason: "scan timeout must be > 0".to_string(),
                    });
                }
            }
            Self::WebSocket { url } => {
                let url = url.trim();
                if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                    return Err(ConnectionError::InvalidParameters {
                        reason: format!("websocket URL must start with ws:// or wss://: {url:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::serial_auto(DEFAULT_BAUD_RATE)
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { port, baud_rate } => write!(
                f,
                "serial {} @ {}",
                port.as_deref().unwrap_or("(auto)"),
                baud_rate
            ),
            Self::Gatt { device_name, .. } => {
                write!(f, "gatt {}", device_name.as_deref().unwrap_or("(any)"))
            }
            Self::WebSocket { url } => write!(f, "websocket {}", url),
        }
    }
}
