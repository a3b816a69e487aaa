//! GRBL Response Classification
//!
//! Classifies non-status controller lines. The line itself is always logged
//! verbatim; classification only decides what else to report about it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-status line from the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrblResponse {
    /// Command accepted
    Ok,
    /// Command rejected with an error code
    Error(u8),
    /// Controller entered an alarm state
    Alarm(u8),
    /// Startup banner, carrying the version text
    Welcome(String),
    /// Bracketed feedback message (`[MSG:...]`, `[GC:...]`, ...)
    Feedback(String),
    /// Setting report (`$n=value`)
    Setting {
        /// Setting number
        number: u16,
        /// Raw value text
        value: String,
    },
    /// Anything else
    Message(String),
}

impl GrblResponse {
    /// Classify one trimmed line
    pub fn classify(line: &str) -> Self {
        let line = line.trim();

        if line.eq_ignore_ascii_case("ok") {
            return Self::Ok;
        }
        if let Some(code) = strip_prefix_ignore_case(line, "error:").and_then(parse_code) {
            return Self::Error(code);
        }
        if let Some(code) = strip_prefix_ignore_case(line, "alarm:").and_then(parse_code) {
            return Self::Alarm(code);
        }
        if let Some(rest) = line.strip_prefix("Grbl ") {
            let version = rest.split_whitespace().next().unwrap_or_default();
            return Self::Welcome(version.to_string());
        }
        if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            return Self::Feedback(inner.to_string());
        }
        if let Some((number, value)) = line.strip_prefix('$').and_then(|l| l.split_once('=')) {
            if let Ok(number) = number.trim().parse::<u16>() {
                return Self::Setting {
                    number,
                    value: value.trim().to_string(),
                };
            }
        }
        Self::Message(line.to_string())
    }

    /// Description of an error or alarm code, if this is one
    pub fn description(&self) -> Option<&'static str> {
        match self {
            Self::Error(code) => Some(error_description(*code)),
            Self::Alarm(code) => Some(alarm_description(*code)),
            _ => None,
        }
    }
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(code) => write!(f, "error {}: {}", code, error_description(*code)),
            Self::Alarm(code) => write!(f, "alarm {}: {}", code, alarm_description(*code)),
            Self::Welcome(version) => write!(f, "welcome: Grbl {}", version),
            Self::Feedback(text) => write!(f, "feedback: {}", text),
            Self::Setting { number, value } => write!(f, "setting: ${}={}", number, value),
            Self::Message(text) => write!(f, "message: {}", text),
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

fn parse_code(text: &str) -> Option<u8> {
    text.trim().parse::<u8>().ok()
}

/// Human-readable GRBL 1.1 error code
pub fn error_description(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid statement",
        4 => "Negative value",
        5 => "Setting disabled",
        6 => "Value < 3 usec",
        7 => "EEPROM read fail. Using defaults",
        8 => "Not idle",
        9 => "G-code lock",
        10 => "Homing not enabled",
        11 => "Line overflow",
        12 => "Step rate > 30kHz",
        13 => "Check Door",
        14 => "Line length exceeded",
        15 => "Travel exceeded",
        16 => "Invalid jog command",
        17 => "Setting disabled",
        20 => "Unsupported or invalid g-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires an integer value",
        24 => "Two commands both require XYZ axis words",
        25 => "Repeated g-code word",
        26 => "No axis words found",
        27 => "Invalid line number",
        28 => "Missing P or L value word",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words with G80 active",
        32 => "Arc has no axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing IJK offset word",
        36 => "Unused g-code words",
        37 => "Tool length offset axis error",
        38 => "Tool number exceeds maximum",
        _ => "Unknown error",
    }
}

/// Human-readable GRBL 1.1 alarm code
pub fn alarm_description(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Abort during cycle",
        4 => "Probe fail",
        5 => "Probe not triggered",
        6 => "Homing fail: reset during cycle",
        7 => "Homing fail: door opened",
        8 => "Homing fail pulloff",
        9 => "Homing fail: limit switch not found",
        10 => "Homing fail: second dual axis switch not found",
        _ => "Unknown alarm",
    }
}
