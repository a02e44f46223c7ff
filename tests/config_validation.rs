//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use packet_bridge::config::{BridgeConfig, LoggingConfig, ServiceConfig, MAX_PAYLOAD_SIZE};
use packet_bridge::error::BridgeError;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = BridgeConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_empty_service_name() {
    let mut config = BridgeConfig::default();
    config.service.name = "   ".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Service name cannot be empty")));
}

#[test]
fn test_service_name_too_long() {
    let config = BridgeConfig::default_with_overrides(|c| c.service.name = "s".repeat(65));
    assert!(config.validate().iter().any(|e| e.contains("too long")));
}

#[test]
fn test_zero_payload_size() {
    let service = ServiceConfig {
        max_payload_size: 0,
        ..ServiceConfig::default()
    };
    assert!(service
        .validate()
        .iter()
        .any(|e| e.contains("cannot be 0")));
}

#[test]
fn test_payload_size_ceiling() {
    let service = ServiceConfig {
        max_payload_size: 1024 * 1024 * 1024,
        ..ServiceConfig::default()
    };
    assert!(service.validate().iter().any(|e| e.contains("too large")));
}

#[test]
fn test_file_logging_without_path() {
    let logging = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_file_logging_missing_directory() {
    let logging = LoggingConfig {
        log_to_file: true,
        log_file_path: Some("/nonexistent/dir/bridge.log".into()),
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("does not exist")));
}

#[test]
fn test_no_logging_output() {
    let logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_validate_strict_collects_every_error() {
    let config = BridgeConfig::default_with_overrides(|c| {
        c.service.name.clear();
        c.service.max_payload_size = 0;
        c.logging.app_name.clear();
    });

    match config.validate_strict() {
        Err(BridgeError::ConfigError(message)) => {
            assert!(message.contains("Service name"));
            assert!(message.contains("Max payload size"));
            assert!(message.contains("Application name"));
        }
        other => panic!("Expected config error, got {other:?}"),
    }
}

#[test]
fn test_toml_roundtrip_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bridge.toml");

    let config = BridgeConfig::default_with_overrides(|c| {
        c.service.name = "lobby".into();
        c.service.max_payload_size = 65_536;
        c.logging.log_level = Level::DEBUG;
        c.logging.json_format = true;
    });
    config.save_to_file(&path).expect("save");

    let loaded = BridgeConfig::from_file(&path).expect("load");
    assert_eq!(loaded.service.name, "lobby");
    assert_eq!(loaded.service.max_payload_size, 65_536);
    assert_eq!(loaded.logging.log_level, Level::DEBUG);
    assert!(loaded.logging.json_format);
}

#[test]
fn test_invalid_log_level_in_toml() {
    let result = BridgeConfig::from_toml(
        r#"
        [logging]
        app_name = "x"
        log_level = "loud"
        log_to_console = true
        log_to_file = false
        json_format = false
        "#,
    );
    assert!(matches!(result, Err(BridgeError::ConfigError(_))));
}

#[test]
fn test_example_config_parses() {
    let text = BridgeConfig::example_config();
    let parsed = BridgeConfig::from_toml(&text).expect("example config should parse");
    assert_eq!(parsed.service.max_payload_size, MAX_PAYLOAD_SIZE);
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        BridgeConfig::from_file("/nonexistent/bridge.toml"),
        Err(BridgeError::ConfigError(_))
    ));
}
