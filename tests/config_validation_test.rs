//! Configuration loading and validation through figment.

use chantrig::config::ChanTrigConfig;
use chantrig::error::ChanTrigError;
use chantrig::firmware::FirmwareBudget;
use chantrig::layout::BufferLayout;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp config");
    file
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ChanTrigConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.log_level, "info");
    assert_eq!(config.firmware.samples_buffer_len, 30_000);
    assert_eq!(config.simulation.poll_interval, Duration::from_millis(10));
}

#[test]
fn test_file_values_override_defaults() {
    let file = write_config(
        r#"
        log_level = "debug"

        [firmware]
        samples_buffer_len = 600

        [extension]
        divider_frontend = 0
        divider_digital_input = 30
        warn_samples_threshold = 90

        [simulation]
        duration = "750ms"
        watch_channel = 3
        "#,
    );
    let config = ChanTrigConfig::load_from(file.path()).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.firmware.samples_buffer_len, 600);
    assert_eq!(config.firmware.spikes_buffer_len, 4_096);
    assert_eq!(config.extension.divider_frontend, 0);
    assert_eq!(config.extension.divider_digital_input, 30);
    assert_eq!(config.extension.warn_samples_threshold, 90);
    assert_eq!(config.simulation.duration, Duration::from_millis(750));
    assert_eq!(config.simulation.watch_channel, 3);
}

#[test]
fn test_type_mismatch_is_a_source_error() {
    let file = write_config(
        r#"
        [firmware]
        samples_buffer_len = "lots"
        "#,
    );
    let err = ChanTrigConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ChanTrigError::ConfigSource(_)));
    assert!(!err.can_recover());
}

#[test]
fn test_invalid_log_level_rejected() {
    let file = write_config(r#"log_level = "chatty""#);
    let err = ChanTrigConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ChanTrigError::ConfigurationRejected(_)));
    assert!(err.to_string().contains("chatty"));
}

#[test]
fn test_zero_poll_interval_rejected() {
    let file = write_config(
        r#"
        [simulation]
        poll_interval = "0s"
        "#,
    );
    assert!(ChanTrigConfig::load_from(file.path()).is_err());
}

#[test]
fn test_request_is_granted_when_it_fits() {
    let file = write_config(
        r#"
        [firmware]
        memory_quota_bytes = 8388608

        [request]
        samples_buffer_len = 3000
        spikes_buffer_len = 512
        trigs_buffer_len = 8
        output_buffer_len = 3000
        "#,
    );
    let config = ChanTrigConfig::load_from(file.path()).unwrap();
    let granted = FirmwareBudget::new(config.firmware)
        .grant(config.request.as_ref(), &config.extension);
    assert_eq!(granted.samples_buffer_len, 3_000);
    assert_eq!(granted.memory_quota_bytes, Some(8_388_608));
    assert!(BufferLayout::resolve(&granted, &config.extension).is_ok());
}

#[test]
fn test_shipped_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/chantrig.toml");
    let config = ChanTrigConfig::load_from(path).unwrap();
    assert_eq!(config.extension.divider_frontend, 0);
    assert!(config.request.is_some());
}
