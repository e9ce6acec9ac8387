use pretty_assertions::assert_eq;
use uartgen_core::protocol::{
    build_duty_command, build_frequency_command, build_identity_query_command, build_off_command,
    build_on_command, build_status_query_command, classify_line, contains_device_signature,
    is_acknowledgement, is_error_reply, parse_status_line, ProtocolError, Reply, StatusReply,
};

#[test]
fn test_frequency_command_valid() {
    assert_eq!(build_frequency_command(1).unwrap().as_str(), "FREQ 1");
    assert_eq!(build_frequency_command(1000).unwrap().as_str(), "FREQ 1000");
    assert_eq!(
        build_frequency_command(40_000_000).unwrap().as_str(),
        "FREQ 40000000"
    );
}

#[test]
fn test_frequency_command_matches_decimal_rendering() {
    for hz in [1i64, 9, 10, 99, 1_000, 123_456, 39_999_999, 40_000_000] {
        assert_eq!(
            build_frequency_command(hz).unwrap().as_str(),
            format!("FREQ {}", hz)
        );
    }
}

#[test]
fn test_frequency_command_invalid() {
    for hz in [0i64, 40_000_001, -1] {
        assert!(matches!(
            build_frequency_command(hz),
            Err(ProtocolError::OutOfRange { .. })
        ));
    }
}

#[test]
fn test_duty_command() {
    for percent in 0..=100i64 {
        assert_eq!(
            build_duty_command(percent).unwrap().as_str(),
            format!("DUTY {}", percent)
        );
    }
    assert!(build_duty_command(101).is_err());
    assert!(build_duty_command(-1).is_err());
}

#[test]
fn test_fixed_commands() {
    assert_eq!(build_on_command().as_str(), "ON");
    assert_eq!(build_off_command().as_str(), "OFF");
    assert_eq!(build_status_query_command().as_str(), "?");
    assert_eq!(build_identity_query_command().as_str(), "VER?");
}

#[test]
fn test_wire_form_has_one_newline() {
    let commands = [
        build_frequency_command(5000).unwrap(),
        build_duty_command(30).unwrap(),
        build_on_command(),
        build_off_command(),
        build_status_query_command(),
        build_identity_query_command(),
    ];
    for cmd in &commands {
        let bytes = cmd.to_bytes();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);
        assert!(bytes.is_ascii());
    }
}

#[test]
fn test_parse_status_valid() {
    assert_eq!(
        parse_status_line("FREQ=5000 DUTY=30 ON"),
        Some(StatusReply {
            frequency: 5000,
            duty: 30,
            output_enabled: true
        })
    );
    assert_eq!(
        parse_status_line("FREQ=1 DUTY=0 OFF"),
        Some(StatusReply {
            frequency: 1,
            duty: 0,
            output_enabled: false
        })
    );
    assert_eq!(
        parse_status_line("  FREQ=100 DUTY=100 ON  "),
        Some(StatusReply {
            frequency: 100,
            duty: 100,
            output_enabled: true
        })
    );
}

#[test]
fn test_parse_status_invalid() {
    assert_eq!(parse_status_line(""), None);
    assert_eq!(parse_status_line("OK FREQ 1000"), None);
    assert_eq!(parse_status_line("FREQ=100"), None);
    assert_eq!(parse_status_line("invalid"), None);
}

#[test]
fn test_device_signature() {
    assert!(contains_device_signature("UART-GEN,1.0\r\n"));
    assert!(contains_device_signature("junk UART-GEN,1.0 more"));
    assert!(contains_device_signature("UART-GEN"));
    assert!(!contains_device_signature(""));
    assert!(!contains_device_signature("FREQ=1000 DUTY=50 OFF"));
    assert!(!contains_device_signature("OK VER?"));
    assert!(!contains_device_signature("other device"));
}

#[test]
fn test_acknowledgement_predicates() {
    assert!(is_acknowledgement("OK ON"));
    assert!(is_acknowledgement("OK FREQ 1000"));
    assert!(is_acknowledgement("  OK ON  "));
    assert!(!is_acknowledgement("ERR FREQ"));

    assert!(is_error_reply("ERR FREQ"));
    assert!(is_error_reply("ERR DUTY 0..100"));
    assert!(is_error_reply("  ERR unknown  "));
    assert!(is_error_reply("ERR unknown"));
    assert!(!is_error_reply("OK ON"));
}

#[test]
fn test_classify_mixed_stream() {
    let stream = [
        "",
        "UART Generator (Arduino). Commands: FREQ, DUTY, ON, OFF, VER?",
        "UART-GEN,1.0",
        "OK FREQ 5000",
        "ERR DUTY 0..100",
        "FREQ=5000 DUTY=30 ON",
    ];
    let replies: Vec<Reply> = stream.iter().filter_map(|l| classify_line(l)).collect();
    assert_eq!(replies.len(), 5);
    assert!(matches!(replies[0], Reply::Other(_)));
    assert!(matches!(replies[1], Reply::Identity(_)));
    assert_eq!(replies[2], Reply::Ok("FREQ 5000".to_string()));
    assert_eq!(replies[3], Reply::Error("DUTY 0..100".to_string()));
    assert!(matches!(replies[4], Reply::Status(s) if s.output_enabled));
}
