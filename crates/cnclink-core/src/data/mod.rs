//! Data models for machine state and connection lifecycle
//!
//! This module provides:
//! - Three-axis positions as reported by the controller
//! - The machine state snapshot published to consumers
//! - Status deltas produced by the status-report parser
//! - Connection lifecycle states
//! - Transport kinds and connection configuration

pub mod connection;

pub use connection::{ConnectionConfig, DEFAULT_BAUD_RATE, DEFAULT_SCAN_TIMEOUT_MS};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A three-axis coordinate as reported in a status report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Subtract another position component-wise
    pub fn subtract(&self, other: &Position) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Snapshot of the machine as last reported by the controller
///
/// Consumers only ever see whole snapshots; the read loop builds a new value
/// for every applied delta and swaps it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    /// Firmware-reported mode, copied verbatim (e.g. "Idle", "Run", "Hold:0")
    pub status: String,
    /// Position relative to the active work coordinate offset
    pub work_position: Position,
    /// Position relative to machine home
    pub machine_position: Position,
    /// Current feed rate (units/min)
    pub feed_rate: f64,
    /// Current spindle speed (RPM)
    pub spindle_speed: f64,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            status: "Idle".to_string(),
            work_position: Position::default(),
            machine_position: Position::default(),
            feed_rate: 0.0,
            spindle_speed: 0.0,
        }
    }
}

/// Field-level update parsed from one status report
///
/// Every field is optional: a field is `None` when the report did not carry
/// it or its payload did not parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusDelta {
    /// Status word
    pub status: Option<String>,
    /// Work position (`WPos:`)
    pub work_position: Option<Position>,
    /// Machine position (`MPos:`)
    pub machine_position: Option<Position>,
    /// Work coordinate offset (`WCO:`)
    pub work_offset: Option<Position>,
    /// Feed rate (`FS:` or `F:`)
    pub feed_rate: Option<f64>,
    /// Spindle speed (`FS:`)
    pub spindle_speed: Option<f64>,
}

impl StatusDelta {
    /// Whether this delta carries nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Build the snapshot that results from applying this delta to `state`
    ///
    /// Fields absent from the delta are carried over unchanged.
    pub fn apply_to(&self, state: &MachineState) -> MachineState {
        MachineState {
            status: self
                .status
                .clone()
                .unwrap_or_else(|| state.status.clone()),
            work_position: self.work_position.unwrap_or(state.work_position),
            machine_position: self.machine_position.unwrap_or(state.machine_position),
            feed_rate: self.feed_rate.unwrap_or(state.feed_rate),
            spindle_speed: self.spindle_speed.unwrap_or(state.spindle_speed),
        }
    }
}

/// State of the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicatorState {
    /// No session; initial and terminal state
    Disconnected,
    /// A transport is being opened
    Connecting,
    /// A session is live
    Connected,
}

impl CommunicatorState {
    /// Check if a transition from this state to `target` is valid.
    ///
    /// Returns `true` for valid transitions:
    /// - Disconnected → Connecting
    /// - Connecting → Connected, Disconnected
    /// - Connected → Disconnected
    pub fn can_transition_to(&self, target: CommunicatorState) -> bool {
        use CommunicatorState::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected | Disconnected)
                | (Connected, Disconnected)
        )
    }

    /// Whether a session is connecting or live
    pub fn is_active(&self) -> bool {
        !matches!(self, CommunicatorState::Disconnected)
    }
}

impl fmt::Display for CommunicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Physical medium used to reach the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Point-to-point serial link (USB CDC, RS-232)
    Serial,
    /// Bluetooth LE GATT link using a UART-over-BLE service
    Gatt,
    /// WebSocket client stream
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Gatt => write!(f, "gatt"),
            Self::WebSocket => write!(f, "websocket"),
        }
    }
}
