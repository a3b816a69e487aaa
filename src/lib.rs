//! # cnclink
//!
//! A live link to GRBL-family CNC controllers:
//! - Serial (USB), Bluetooth LE (Nordic UART Service), and WebSocket transports
//! - Continuous status polling and status-report parsing
//! - Ordered, framed command sending with a bounded I/O trace
//! - A consistent machine-state snapshot for dashboards and other consumers
//!
//! ## Architecture
//!
//! 1. **cnclink-core** - Machine state, connection config, event log, events, errors
//! 2. **cnclink-communication** - Transports, GRBL protocol, connection manager
//! 3. **cnclink-settings** - TOML/JSON settings files
//! 4. **cnclink** - This crate: logging setup, re-exports, and the console binary

pub use cnclink_communication::{
    commands, list_ports, Command, CommandDispatcher, ConnectionManager, DefaultTransportFactory,
    GrblResponse, LineBuffer, LoopbackFactory, LoopbackHandle, MachineStateStore, ManagerConfig,
    ProbeSettings, SerialPortInfo, StatusParser, Transport, TransportEvent, TransportFactory,
    DEFAULT_POLL_INTERVAL, DEFAULT_SEQUENCE_GAP,
};

pub use cnclink_core::{
    CommunicatorState, ConnectionConfig, ConnectionError, ControllerError, Error, EventDispatcher,
    EventLog, LinkEvent, LogDirection, LogEntry, MachineState, Position, Result, StatusDelta,
    TransportKind,
};

pub use cnclink_settings::{default_config_path, ConnectionSettings, LinkSettings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("CNCLINK_BUILD_DATE");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Initialize logging with the default configuration
///
/// `RUST_LOG` is honoured; the default level is `info`.
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(tracing::Level::INFO, LogFormat::Text)
}

/// Initialize logging at `level` in the given format
///
/// Output goes to stderr so it never mixes with console I/O on stdout.
pub fn init_logging_with(level: tracing::Level, format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}
