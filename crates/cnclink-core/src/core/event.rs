//! Event system for link consumers
//!
//! Provides:
//! - Event types for connection, machine state, and log changes
//! - Event dispatcher for publishing events to subscribers

use crate::core::event_log::LogEntry;
use crate::data::{CommunicatorState, MachineState};
use tokio::sync::broadcast;

/// Link event types
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Connection lifecycle state changed
    StateChanged(CommunicatorState),
    /// A status report replaced the machine snapshot
    MachineStateChanged(MachineState),
    /// An entry was appended to the event log
    LogAppended(LogEntry),
    /// Controller reported an alarm
    ControllerAlarm {
        /// Alarm code
        code: u8,
        /// Human-readable description
        description: String,
    },
    /// Controller rejected a command
    ControllerError {
        /// Error code
        code: u8,
        /// Human-readable description
        description: String,
    },
}

impl std::fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEvent::StateChanged(state) => write!(f, "State: {}", state),
            LinkEvent::MachineStateChanged(state) => write!(
                f,
                "{} WPos({}) MPos({}) F{} S{}",
                state.status,
                state.work_position,
                state.machine_position,
                state.feed_rate,
                state.spindle_speed
            ),
            LinkEvent::LogAppended(entry) => write!(f, "{}", entry),
            LinkEvent::ControllerAlarm { code, description } => {
                write!(f, "Alarm {} ({})", code, description)
            }
            LinkEvent::ControllerError { code, description } => {
                write!(f, "Error {} ({})", code, description)
            }
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for link events.
    tx: broadcast::Sender<LinkEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received it. Having no
    /// subscribers is not an error.
    pub fn publish(&self, event: LinkEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
