//! Bounded I/O trace
//!
//! Keeps the most recent sent/received/error lines for display. Entries are
//! insertion-ordered; once the capacity is reached the oldest entry is dropped
//! for each new one.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Number of entries kept by [`EventLog::default`]
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Direction of a logged line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDirection {
    /// Written to the controller
    Sent,
    /// Read from the controller
    Received,
    /// Failure or operator-visible warning
    Error,
}

impl LogDirection {
    /// Prefix used when rendering an entry
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sent => "→",
            Self::Received => "←",
            Self::Error => "!!",
        }
    }
}

/// One line of the I/O trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Direction of the line
    pub direction: LogDirection,
    /// Line text without terminator
    pub text: String,
    /// When the entry was created
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(direction: LogDirection, text: impl Into<String>) -> Self {
        Self {
            direction,
            text: text.into(),
            timestamp: Local::now(),
        }
    }

    /// Entry for a command written to the controller
    pub fn sent(text: impl Into<String>) -> Self {
        Self::new(LogDirection::Sent, text)
    }

    /// Entry for a line read from the controller
    pub fn received(text: impl Into<String>) -> Self {
        Self::new(LogDirection::Received, text)
    }

    /// Error-styled entry
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LogDirection::Error, text)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.direction.prefix(),
            self.text
        )
    }
}

/// Append-only ring buffer of [`LogEntry`] values
#[derive(Debug)]
pub struct EventLog {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl EventLog {
    /// Create a log holding at most `capacity` entries (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of all entries, most recent last
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    /// Most recent entry, if any
    pub fn last(&self) -> Option<LogEntry> {
        self.entries.read().back().cloned()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Maximum number of entries held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}
