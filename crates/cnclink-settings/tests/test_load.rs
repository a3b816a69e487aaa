use cnclink_core::{ConnectionConfig, TransportKind};
use cnclink_settings::{LinkSettings, SettingsError};
use std::io::Write;
use tempfile::Builder;

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_toml() {
    let file = write_temp(
        ".toml",
        r#"
        poll_interval_ms = 100
        log_capacity = 50

        [connection]
        transport = "serial"
        serial_port = "/dev/ttyACM0"
        baud_rate = 250000
        "#,
    );
    let settings = LinkSettings::load_from_file(file.path()).unwrap();
    assert_eq!(settings.log_capacity, 50);
    assert_eq!(
        settings.connection_config(),
        ConnectionConfig::Serial {
            port: Some("/dev/ttyACM0".to_string()),
            baud_rate: 250_000,
        }
    );
    assert_eq!(settings.manager_config().poll_interval.as_millis(), 100);
}

#[test]
fn test_load_json() {
    let file = write_temp(
        ".json",
        r#"{ "connection": { "transport": "gatt", "ble_device_name": "GRBL-BLE" } }"#,
    );
    let settings = LinkSettings::load_from_file(file.path()).unwrap();
    assert_eq!(settings.connection.transport, TransportKind::Gatt);
    assert_eq!(
        settings.connection_config(),
        ConnectionConfig::gatt(Some("GRBL-BLE".to_string()))
    );
}

#[test]
fn test_unsupported_extension() {
    let file = write_temp(".yaml", "connection: {}");
    assert!(matches!(
        LinkSettings::load_from_file(file.path()),
        Err(SettingsError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let file = write_temp(".toml", "log_capacity = 0\n");
    assert!(matches!(
        LinkSettings::load_from_file(file.path()),
        Err(SettingsError::InvalidSetting { .. })
    ));
}

#[test]
fn test_malformed_file() {
    let file = write_temp(".toml", "[connection\ntransport = ");
    assert!(matches!(
        LinkSettings::load_from_file(file.path()),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        LinkSettings::load_from_file(std::path::Path::new("/nonexistent/cnclink.toml")),
        Err(SettingsError::IoError(_))
    ));
}
