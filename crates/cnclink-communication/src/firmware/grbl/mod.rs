//! GRBL protocol support
//!
//! Status report decoding, response classification, and command builders for
//! GRBL 1.1 and compatible firmware (grblHAL, FluidNC).

pub mod commands;
pub mod response;
pub mod status_parser;

pub use commands::{Axis, ProbeSettings, SpindleDirection, SOFT_RESET, STATUS_QUERY};
pub use response::{alarm_description, error_description, GrblResponse};
pub use status_parser::StatusParser;
