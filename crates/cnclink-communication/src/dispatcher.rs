//! Outbound command path
//!
//! Applies the framing rule (realtime bytes go out bare, everything else gets
//! one `\n`), writes each frame as one indivisible transport write, and
//! records what was sent in the event log.

use crate::firmware::grbl::{SOFT_RESET, STATUS_QUERY};
use crate::transport::SharedTransport;
use cnclink_core::{EventDispatcher, EventLog, LinkEvent, LogEntry, Result};
use std::fmt;
use std::sync::Arc;

/// A command on its way to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Realtime status query (`?`), never logged
    StatusQuery,
    /// Soft reset byte (0x18)
    SoftReset,
    /// Ordinary line-terminated command
    Line(String),
}

impl Command {
    /// Classify caller text
    ///
    /// `"?"` and the bare reset byte are realtime commands. Anything else is
    /// an ordinary command; a line terminator the caller already appended is
    /// dropped so exactly one goes out.
    pub fn parse(text: &str) -> Self {
        match text.as_bytes() {
            [STATUS_QUERY] => Self::StatusQuery,
            [SOFT_RESET] => Self::SoftReset,
            _ => Self::Line(text.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Bytes written to the transport
    pub fn frame(&self) -> Vec<u8> {
        match self {
            Self::StatusQuery => vec![STATUS_QUERY],
            Self::SoftReset => vec![SOFT_RESET],
            Self::Line(text) => {
                let mut frame = Vec::with_capacity(text.len() + 1);
                frame.extend_from_slice(text.as_bytes());
                frame.push(b'\n');
                frame
            }
        }
    }

    /// Whether this command bypasses line buffering
    pub fn is_realtime(&self) -> bool {
        !matches!(self, Self::Line(_))
    }

    /// Event log entry recorded after a successful write
    pub fn log_entry(&self) -> Option<LogEntry> {
        match self {
            Self::StatusQuery => None,
            Self::SoftReset => Some(LogEntry::error("Soft reset sent")),
            Self::Line(text) => Some(LogEntry::sent(text.clone())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusQuery => write!(f, "?"),
            Self::SoftReset => write!(f, "soft reset"),
            Self::Line(text) => write!(f, "{}", text),
        }
    }
}

/// Event log plus the event channel announcing each append
#[derive(Clone)]
pub(crate) struct LogSink {
    log: Arc<EventLog>,
    events: EventDispatcher,
}

impl LogSink {
    pub(crate) fn new(log: Arc<EventLog>, events: EventDispatcher) -> Self {
        Self { log, events }
    }

    pub(crate) fn record(&self, entry: LogEntry) {
        self.log.append(entry.clone());
        self.events.publish(LinkEvent::LogAppended(entry));
    }

    pub(crate) fn log(&self) -> &Arc<EventLog> {
        &self.log
    }
}

/// Writes commands through the session's transport
#[derive(Clone)]
pub struct CommandDispatcher {
    transport: SharedTransport,
    sink: LogSink,
}

impl CommandDispatcher {
    pub(crate) fn new(transport: SharedTransport, sink: LogSink) -> Self {
        Self { transport, sink }
    }

    /// Send one command
    ///
    /// The transport lock is held for the write and the log append, so frames
    /// never interleave and the log matches write order. A failed write is
    /// logged once (except for status polls) and returned; it is not retried.
    pub async fn send(&self, command: &Command) -> Result<()> {
        let frame = command.frame();
        let mut transport = self.transport.lock().await;
        match transport.write_frame(&frame).await {
            Ok(()) => {
                tracing::debug!(">> {}", command);
                if let Some(entry) = command.log_entry() {
                    self.sink.record(entry);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to send {}: {}", command, e);
                if !matches!(command, Command::StatusQuery) {
                    self.sink
                        .record(LogEntry::error(format!("Failed to send: {}", command)));
                }
                Err(e)
            }
        }
    }

    /// Close the underlying transport
    pub(crate) async fn close(&self) -> Result<()> {
        self.transport.lock().await.close().await
    }
}
