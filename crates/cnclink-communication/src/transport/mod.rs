//! Transports to the controller
//!
//! Every physical medium implements [`Transport`]: open it with a
//! [`ConnectionConfig`], write frames, close it. Incoming data from any medium
//! arrives the same way, as [`TransportEvent`]s on the channel returned by
//! `open`, so the read loop never sees a medium-specific callback shape.
//!
//! Supports:
//! - Serial/USB ([`serial::SerialTransport`])
//! - Bluetooth LE UART service ([`gatt::GattTransport`])
//! - WebSocket ([`websocket::WebSocketTransport`])
//! - In-memory loopback for tests and simulation ([`loopback::LoopbackTransport`])

pub mod gatt;
pub mod loopback;
pub mod serial;
pub mod websocket;

use async_trait::async_trait;
use cnclink_core::{ConnectionConfig, ConnectionError, Result, TransportKind};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Capacity of the channel carrying incoming chunks to the read loop
pub const INCOMING_CHANNEL_CAPACITY: usize = 256;

/// Something that happened on the incoming side of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw bytes or text, not yet split into lines
    Data(Vec<u8>),
    /// The medium went away; no further events follow
    Closed {
        /// Why the stream ended
        reason: String,
    },
}

/// Receiving half handed to the read loop by [`Transport::open`]
pub type IncomingStream = mpsc::Receiver<TransportEvent>;

/// A transport shared between the dispatcher and the session teardown.
///
/// The async mutex makes each frame write indivisible and preserves the order
/// in which senders queued up.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Uniform capability set over one physical medium
///
/// Implementations move raw bytes only; they never buffer lines or interpret
/// content.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which medium this transport drives
    fn kind(&self) -> TransportKind;

    /// Open the medium and start forwarding incoming data
    ///
    /// Fails if the config is for a different kind, the medium is
    /// unavailable, or the handshake fails. On failure nothing is left open.
    async fn open(&mut self, config: &ConnectionConfig) -> Result<IncomingStream>;

    /// Write one frame exactly as given
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Stop forwarding incoming data and release the medium
    ///
    /// Closing a transport that is not open is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently open
    fn is_open(&self) -> bool;
}

/// Builds a transport for a connection attempt
///
/// The manager picks the implementation from the configured kind, never by
/// inspecting a live transport.
pub trait TransportFactory: Send + Sync {
    /// Create an unopened transport for `kind`
    fn create(&self, kind: TransportKind) -> Box<dyn Transport>;
}

/// Factory for the real hardware transports
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: TransportKind) -> Box<dyn Transport> {
        match kind {
            TransportKind::Serial => Box::new(serial::SerialTransport::new()),
            TransportKind::Gatt => Box::new(gatt::GattTransport::new()),
            TransportKind::WebSocket => Box::new(websocket::WebSocketTransport::new()),
        }
    }
}

/// Wrap a transport for sharing
pub fn shared(transport: Box<dyn Transport>) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}

/// Error for a config handed to the wrong transport kind
pub(crate) fn kind_mismatch(expected: TransportKind, config: &ConnectionConfig) -> ConnectionError {
    ConnectionError::InvalidParameters {
        reason: format!("{} transport cannot open a {} config", expected, config.kind()),
    }
}
