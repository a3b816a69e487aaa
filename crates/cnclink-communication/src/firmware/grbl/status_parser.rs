//! GRBL Status Report Parsing
//!
//! Decodes `<Status|KEY:payload|...>` lines into a [`StatusDelta`]. Known
//! fields are `WPos`, `MPos`, `WCO`, `FS` and `F`; anything else is ignored so
//! newer firmware fields pass through harmlessly.

use cnclink_core::{Position, StatusDelta};

/// Stateless decoder for GRBL status reports
pub struct StatusParser;

impl StatusParser {
    /// Parse one trimmed line
    ///
    /// Returns `None` when the line is not enveloped in `<` `>`. Inside the
    /// envelope, a field whose payload does not parse is left out of the
    /// delta; the remaining fields still apply.
    pub fn parse(line: &str) -> Option<StatusDelta> {
        let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;
        let mut fields = body.split('|');

        let mut delta = StatusDelta::default();
        let status = fields.next().unwrap_or_default();
        if !status.is_empty() {
            delta.status = Some(status.to_string());
        }

        for field in fields {
            let Some((key, payload)) = field.split_once(':') else {
                continue;
            };
            match key.trim() {
                "WPos" => delta.work_position = Self::parse_position(payload),
                "MPos" => delta.machine_position = Self::parse_position(payload),
                "WCO" => delta.work_offset = Self::parse_position(payload),
                "FS" => {
                    if let Some([feed, spindle]) = Self::parse_numbers::<2>(payload) {
                        delta.feed_rate = Some(feed);
                        delta.spindle_speed = Some(spindle);
                    }
                }
                "F" => {
                    if let Some([feed]) = Self::parse_numbers::<1>(payload) {
                        delta.feed_rate = Some(feed);
                    }
                }
                _ => {}
            }
        }

        Some(delta)
    }

    /// Whether `line` carries the status envelope
    pub fn is_status_report(line: &str) -> bool {
        let line = line.trim();
        line.starts_with('<') && line.ends_with('>') && line.len() >= 2
    }

    fn parse_position(payload: &str) -> Option<Position> {
        let [x, y, z] = Self::parse_numbers::<3>(payload)?;
        Some(Position::new(x, y, z))
    }

    /// Exactly `N` leading comma-separated finite numbers
    ///
    /// Extra trailing axes (A/B/C) are ignored.
    fn parse_numbers<const N: usize>(payload: &str) -> Option<[f64; N]> {
        let mut values = [0.0; N];
        let mut parts = payload.split(',');
        for slot in values.iter_mut() {
            let value = parts.next()?.trim().parse::<f64>().ok()?;
            if !value.is_finite() {
                return None;
            }
            *slot = value;
        }
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_idle_with_wpos_and_fs() {
        let delta = StatusParser::parse("<Idle|WPos:1.000,2.000,-0.500|FS:800,0>").unwrap();
        assert_eq!(delta.status.as_deref(), Some("Idle"));
        assert_eq!(delta.work_position, Some(Position::new(1.0, 2.0, -0.5)));
        assert_eq!(delta.machine_position, None);
        assert_eq!(delta.feed_rate, Some(800.0));
        assert_eq!(delta.spindle_speed, Some(0.0));
    }

    #[test]
    fn test_parse_mpos_with_wco() {
        let delta =
            StatusParser::parse("<Run|MPos:10.000,20.000,-5.000|FS:1500,12000|WCO:2.000,5.000,-1.000>")
                .unwrap();
        assert_eq!(delta.status.as_deref(), Some("Run"));
        assert_eq!(delta.machine_position, Some(Position::new(10.0, 20.0, -5.0)));
        assert_eq!(delta.work_offset, Some(Position::new(2.0, 5.0, -1.0)));
        assert_eq!(delta.work_position, None);
        assert_eq!(delta.spindle_speed, Some(12000.0));
    }

    #[test]
    fn test_parse_status_with_substate() {
        let delta = StatusParser::parse("<Hold:0|MPos:0.000,0.000,0.000|Bf:15,128>").unwrap();
        assert_eq!(delta.status.as_deref(), Some("Hold:0"));
    }

    #[test]
    fn test_status_word_copied_verbatim() {
        let delta = StatusParser::parse("<Idle |MPos:0,0,0>").unwrap();
        assert_eq!(delta.status.as_deref(), Some("Idle "));
    }

    #[test]
    fn test_feed_only_field() {
        let delta = StatusParser::parse("<Idle|MPos:0,0,0|F:500>").unwrap();
        assert_eq!(delta.feed_rate, Some(500.0));
        assert_eq!(delta.spindle_speed, None);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let delta =
            StatusParser::parse("<Idle|MPos:1,2,3|Bf:15,128|Ln:99|Pn:XYZ|Ov:100,100,100|A:S>")
                .unwrap();
        assert_eq!(delta.machine_position, Some(Position::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_malformed_field_is_absent() {
        let delta = StatusParser::parse("<Idle|WPos:1.000,2.000,oops|FS:800,0>").unwrap();
        assert_eq!(delta.status.as_deref(), Some("Idle"));
        assert_eq!(delta.work_position, None);
        assert_eq!(delta.feed_rate, Some(800.0));

        let delta = StatusParser::parse("<Idle|MPos:1,2|FS:abc,0|WCO:>").unwrap();
        assert_eq!(delta.machine_position, None);
        assert_eq!(delta.feed_rate, None);
        assert_eq!(delta.work_offset, None);
    }

    #[test]
    fn test_extra_axes_ignored() {
        let delta = StatusParser::parse("<Idle|MPos:1.0,2.0,3.0,90.0>").unwrap();
        assert_eq!(delta.machine_position, Some(Position::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_not_status_reports() {
        for line in [
            "ok",
            "error:20",
            "ALARM:1",
            "Grbl 1.1h ['$' for help]",
            "[MSG:'$H'|'$X' to unlock]",
            "<Idle|MPos:0,0,0",
            "Idle|MPos:0,0,0>",
            "",
        ] {
            assert!(StatusParser::parse(line).is_none(), "{line:?}");
            assert!(!StatusParser::is_status_report(line), "{line:?}");
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let delta = StatusParser::parse("<Idle|WPos:NaN,0,0|FS:inf,0>").unwrap();
        assert_eq!(delta.work_position, None);
        assert_eq!(delta.feed_rate, None);
    }

    proptest! {
        #[test]
        fn well_formed_reports_parse(
            status in "(Idle|Run|Jog|Alarm|Door:[0-3]|Hold:[01]|Home|Check|Sleep)",
            x in -10_000.0f64..10_000.0,
            y in -10_000.0f64..10_000.0,
            z in -1_000.0f64..1_000.0,
            feed in 0u32..20_000,
            spindle in 0u32..30_000,
        ) {
            let line = format!("<{status}|WPos:{x:.3},{y:.3},{z:.3}|FS:{feed},{spindle}>");
            let delta = StatusParser::parse(&line).unwrap();
            let pos = delta.work_position.unwrap();
            prop_assert_eq!(delta.status.as_deref(), Some(status.as_str()));
            prop_assert!((pos.x - x).abs() < 0.001);
            prop_assert!((pos.y - y).abs() < 0.001);
            prop_assert!((pos.z - z).abs() < 0.001);
            prop_assert_eq!(delta.feed_rate, Some(feed as f64));
            prop_assert_eq!(delta.spindle_speed, Some(spindle as f64));
            prop_assert_eq!(delta.machine_position, None);
        }

        #[test]
        fn unenveloped_lines_are_rejected(line in "[^<][ -~]{0,40}") {
            prop_assert!(StatusParser::parse(&line).is_none() || line.trim_start().starts_with('<'));
        }
    }
}
