//! Link settings
//!
//! Read from a TOML or JSON file, validated, then turned into the runtime
//! [`ConnectionConfig`] and [`ManagerConfig`]. Settings are never written
//! back.
//!
//! ```toml
//! poll_interval_ms = 250
//! log_capacity = 500
//!
//! [connection]
//! transport = "serial"
//! serial_port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! ```

use crate::error::{SettingsError, SettingsResult};
use cnclink_communication::ManagerConfig;
use cnclink_core::{
    ConnectionConfig, TransportKind, DEFAULT_BAUD_RATE, DEFAULT_LOG_CAPACITY,
    DEFAULT_SCAN_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the settings file inside the config directory
pub const CONFIG_FILE_NAME: &str = "cnclink.toml";

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Transport to use
    pub transport: TransportKind,
    /// Serial port; unset picks the first CNC-looking port
    pub serial_port: Option<String>,
    /// Serial baud rate
    pub baud_rate: u32,
    /// WebSocket endpoint
    pub websocket_url: Option<String>,
    /// Advertised BLE name filter
    pub ble_device_name: Option<String>,
    /// BLE scan timeout in milliseconds
    pub ble_scan_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Serial,
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            websocket_url: None,
            ble_device_name: None,
            ble_scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
        }
    }
}

/// Everything the link reads from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Status poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Entries kept in the event log
    pub log_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            poll_interval_ms: 250,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl LinkSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let settings: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("(none)").to_string(),
                ))
            }
        };

        settings.validate()?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load the default settings file if it exists, otherwise defaults
    pub fn load_or_default() -> SettingsResult<Self> {
        match default_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate settings
    pub fn validate(&self) -> SettingsResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::invalid("poll_interval_ms", "must be > 0"));
        }

        if self.log_capacity == 0 {
            return Err(SettingsError::invalid("log_capacity", "must be > 0"));
        }

        let connection = &self.connection;
        if connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }

        if connection.ble_scan_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.ble_scan_timeout_ms",
                "must be > 0",
            ));
        }

        if connection.transport == TransportKind::WebSocket && connection.websocket_url.is_none() {
            return Err(SettingsError::invalid(
                "connection.websocket_url",
                "required for the websocket transport",
            ));
        }

        self.connection_config()
            .validate()
            .map_err(|e| SettingsError::invalid("connection", e.to_string()))
    }

    /// Connection config for the selected transport
    pub fn connection_config(&self) -> ConnectionConfig {
        let connection = &self.connection;
        match connection.transport {
            TransportKind::Serial => ConnectionConfig::Serial {
                port: connection.serial_port.clone(),
                baud_rate: connection.baud_rate,
            },
            TransportKind::Gatt => ConnectionConfig::Gatt {
                device_name: connection.ble_device_name.clone(),
                scan_timeout_ms: connection.ble_scan_timeout_ms,
            },
            TransportKind::WebSocket => ConnectionConfig::WebSocket {
                url: connection.websocket_url.clone().unwrap_or_default(),
            },
        }
    }

    /// Manager config built from these settings
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            log_capacity: self.log_capacity,
            ..Default::default()
        }
    }
}

/// `<config dir>/cnclink/cnclink.toml`
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("cnclink").join(CONFIG_FILE_NAME))
        .ok_or_else(|| SettingsError::ConfigDirectory("no config directory on this platform".to_string()))
}
