//! # cnclink communication
//!
//! Live link to a GRBL-family controller over serial, Bluetooth LE GATT, or
//! WebSocket transports. Parses the status-report protocol, serializes
//! outbound commands, and keeps the machine snapshot consumers read.

pub mod dispatcher;
pub mod firmware;
pub mod framing;
pub mod manager;
pub mod state;
pub mod transport;

pub use dispatcher::{Command, CommandDispatcher};
pub use firmware::grbl::{commands, GrblResponse, ProbeSettings, StatusParser};
pub use framing::LineBuffer;
pub use manager::{
    ConnectionManager, ManagerConfig, DEFAULT_POLL_INTERVAL, DEFAULT_SEQUENCE_GAP,
};
pub use state::MachineStateStore;
pub use transport::{
    gatt::GattTransport,
    loopback::{LoopbackFactory, LoopbackHandle, LoopbackTransport},
    serial::{list_ports, SerialPortInfo, SerialTransport},
    websocket::WebSocketTransport,
    DefaultTransportFactory, IncomingStream, SharedTransport, Transport, TransportEvent,
    TransportFactory,
};
