//! GRBL command builders
//!
//! Formats the command strings an operator panel sends. Nothing here
//! interprets G-code; the strings go out through the dispatcher like any other
//! ordinary command.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Realtime status query, sent unterminated
pub const STATUS_QUERY: u8 = b'?';

/// Soft reset control byte (Ctrl-X), sent unterminated
pub const SOFT_RESET: u8 = 0x18;

/// A linear machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// Spindle rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpindleDirection {
    /// M3
    Clockwise,
    /// M4
    CounterClockwise,
}

/// Homing cycle (`$H`)
pub fn home() -> String {
    "$H".to_string()
}

/// Single-axis homing (`$HX`)
pub fn home_axis(axis: Axis) -> String {
    format!("$H{}", axis)
}

/// Clear an alarm lock (`$X`)
pub fn unlock() -> String {
    "$X".to_string()
}

/// Relative metric jog: `$J=G91 G21 X10 F1000`
pub fn jog(axis: Axis, distance: f64, feed_rate: f64) -> String {
    format!("$J=G91 G21 {}{} F{}", axis, distance, feed_rate)
}

/// Set the current position of one axis as work zero in G54
pub fn zero_axis(axis: Axis) -> String {
    format!("G10 L20 P1 {}0", axis)
}

/// Set the current position as work zero on all axes
pub fn zero_all() -> String {
    "G10 L20 P1 X0 Y0 Z0".to_string()
}

/// Start the spindle: `M3 S1000`
pub fn spindle_on(direction: SpindleDirection, rpm: u32) -> String {
    let code = match direction {
        SpindleDirection::Clockwise => "M3",
        SpindleDirection::CounterClockwise => "M4",
    };
    format!("{} S{}", code, rpm)
}

/// Stop the spindle (`M5`)
pub fn spindle_off() -> String {
    "M5".to_string()
}

/// Change spindle speed without changing state
pub fn set_spindle_speed(rpm: u32) -> String {
    format!("S{}", rpm)
}

/// Touch-plate probing parameters (mm, mm/min)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Plate thickness applied as the Z offset after touch-off
    pub plate_thickness: f64,
    /// Furthest the probe travels looking for contact
    pub search_distance: f64,
    /// Probing feed rate
    pub feed_rate: f64,
    /// Back-off after contact
    pub retract_distance: f64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            plate_thickness: 20.0,
            search_distance: 10.0,
            feed_rate: 100.0,
            retract_distance: 2.0,
        }
    }
}

/// Five-command touch-plate probe along one axis
///
/// `direction` is the sign of travel towards the plate (`-1.0` for Z down).
/// Z touches off at the plate thickness; X and Y touch off at zero. The
/// retract always moves away from the plate.
pub fn probe_sequence(settings: &ProbeSettings, axis: Axis, direction: f64) -> Vec<String> {
    let dir = if direction < 0.0 { -1.0 } else { 1.0 };
    let touch_off = match axis {
        Axis::Z => settings.plate_thickness,
        Axis::X | Axis::Y => 0.0,
    };
    vec![
        "G91 G21".to_string(),
        format!(
            "G38.2 {}{} F{}",
            axis,
            dir * settings.search_distance,
            settings.feed_rate
        ),
        format!("G10 L20 P1 {}{}", axis, touch_off),
        format!("G0 {}{}", axis, -dir * settings.retract_distance),
        "G90".to_string(),
    ]
}
