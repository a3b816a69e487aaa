//! Firmware protocol implementations

pub mod grbl;
