//! Error handling for cnclink
//!
//! Provides error types for the layers of the device link:
//! - Controller errors (session lifecycle misuse)
//! - Connection errors (transport open, write, and stream failures)
//!
//! All error types use `thiserror` for ergonomic error handling.

use crate::data::TransportKind;
use thiserror::Error;

/// Controller error type
///
/// Represents misuse of the connection lifecycle, such as sending while no
/// session is active.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// No session is active
    #[error("Controller not connected")]
    NotConnected,

    /// A session is already connecting or connected
    #[error("Controller already connected")]
    AlreadyConnected,
}

/// Connection error type
///
/// Represents errors raised by a transport: opening the medium, writing a
/// frame, or losing the incoming stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No usable serial port was found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The requested port, or a description of the search.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No wireless device advertising the expected service was found
    #[error("Device not found: {reason}")]
    DeviceNotFound {
        /// What was searched for and why it failed.
        reason: String,
    },

    /// The socket or GATT handshake failed
    #[error("Handshake with {endpoint} failed: {reason}")]
    HandshakeFailed {
        /// URL or device identifier.
        endpoint: String,
        /// The reason the handshake failed.
        reason: String,
    },

    /// The transport rejected a frame
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Operation on a transport that is not open
    #[error("Transport is not open")]
    NotOpen,

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Transport kind not available in this build or on this host
    #[error("{kind} transport unsupported: {reason}")]
    Unsupported {
        /// The transport kind requested.
        kind: TransportKind,
        /// Why it cannot be used.
        reason: String,
    },
}

/// Main error type for cnclink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Check if this error means no session was active
    pub fn is_not_connected(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::NotConnected)
                | Error::Connection(ConnectionError::NotOpen)
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
