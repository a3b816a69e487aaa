//! # cnclink core
//!
//! Core types, events, and errors shared by the cnclink crates.
//! Provides the machine state snapshot, connection configuration, the
//! bounded I/O trace, and the event dispatcher consumers subscribe to.

pub mod core;
pub mod data;
pub mod error;
pub mod types;

pub use core::{
    event::{EventDispatcher, LinkEvent},
    event_log::{EventLog, LogDirection, LogEntry, DEFAULT_LOG_CAPACITY},
};

pub use data::{
    CommunicatorState, ConnectionConfig, MachineState, Position, StatusDelta, TransportKind,
    DEFAULT_BAUD_RATE, DEFAULT_SCAN_TIMEOUT_MS,
};

pub use error::{ConnectionError, ControllerError, Error, Result};

pub use types::{thread_safe, thread_safe_rw, ThreadSafe, ThreadSafeRw};
