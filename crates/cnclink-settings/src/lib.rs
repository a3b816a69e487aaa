//! # cnclink settings
//!
//! File-backed link settings: which transport to open, with what parameters,
//! and how often to poll.

pub mod config;
pub mod error;

pub use config::{default_config_path, ConnectionSettings, LinkSettings, CONFIG_FILE_NAME};
pub use error::{SettingsError, SettingsResult};
