//! Link-facing services shared by every crate: the I/O trace and the event
//! dispatcher.

pub mod event;
pub mod event_log;

pub use event::{EventDispatcher, LinkEvent};
pub use event_log::{EventLog, LogDirection, LogEntry, DEFAULT_LOG_CAPACITY};
