use std::io::Write;
use std::time::Duration;

use uartgen_core::protocol::{CommandBuilder, ProtocolError, Settings};

#[test]
fn test_load_settings_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
            "device": {{ "frequency_max": 20000000 }},
            "probe": {{ "boot_delay_ms": 1200, "total_timeout_ms": 3000 }},
            "session": {{ "reply_window_ms": 250 }}
        }}"#
    )
    .unwrap();

    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.device.frequency_max, 20_000_000);
    assert_eq!(settings.device.signature, "UART-GEN");
    assert_eq!(settings.probe.boot_delay(), Duration::from_millis(1200));
    assert_eq!(settings.probe.total_timeout(), Duration::from_secs(3));
    assert_eq!(settings.probe.retry_gap(), Duration::from_millis(150));
    assert_eq!(settings.session.reply_window(), Duration::from_millis(250));

    let builder = CommandBuilder::new(settings.device);
    assert!(builder.frequency(20_000_000).is_ok());
    assert!(builder.frequency(20_000_001).is_err());
}

#[test]
fn test_missing_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Settings::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ProtocolError::Config(msg) if msg.contains("absent.json")));
}

#[test]
fn test_settings_round_trip_through_json() {
    let settings = Settings::default();
    let text = serde_json::to_string_pretty(&settings).unwrap();
    assert_eq!(Settings::from_json(&text).unwrap(), settings);
}
