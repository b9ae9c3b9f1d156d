use std::io::Write;

use super::*;

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.tracker.heartbeat_interval_ms, 500);
    assert_eq!(config.tracker.batch_size, 100);
    assert_eq!(config.runner.shell, "bash");
}

#[test]
fn test_from_toml_fills_missing_sections() {
    let config = AppConfig::from_toml(
        r#"
[tracker]
heartbeat_interval_ms = 1000
batch_size = 10
machine_tracker_enabled = true
job_tracker_enabled = false
"#,
    )
    .unwrap();

    assert_eq!(config.tracker.heartbeat_interval_ms, 1000);
    assert!(!config.tracker.job_tracker_enabled);
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.observability.log_format, "pretty");
}

#[test]
fn test_toml_roundtrip() {
    let config = AppConfig::default();
    let text = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&text).unwrap();
    assert_eq!(parsed.database.url, config.database.url);
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = AppConfig::default();
    config.database.url = "postgresql://localhost/db".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.tracker.heartbeat_interval_ms = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.log_level = "verbose".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.runner.shell = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[runner]
shell = "sh"
translate_windows_paths = true
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.database.url, "sqlite::memory:");
    assert_eq!(config.runner.shell, "sh");
    assert!(config.runner.translate_windows_paths);
    assert_eq!(config.tracker.heartbeat_interval_ms, 500);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(AppConfig::load(Some("/nonexistent/orchestra.toml")).is_err());
}
