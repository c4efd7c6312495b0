use crabcast::config::{ConfigError, StreamerConfig};
use std::fs;

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("crabcast.toml");

    let mut config = StreamerConfig::default();
    config.capture.source = "/dev/video2".to_string();
    config.server.port = 9100;
    config.transport.ice_servers = vec!["stun:stun.l.google.com:19302".to_string()];
    config.save_to_file(&path).unwrap();

    let loaded = StreamerConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_malformed_file_is_parse_error() {
    let file = tempfile::NamedTempFile::new().unwrap();
    fs::write(file.path(), "[capture\nwidth = ").unwrap();

    let err = StreamerConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("failed to parse"));
}

#[test]
fn test_wrong_type_is_parse_error() {
    let file = tempfile::NamedTempFile::new().unwrap();
    fs::write(file.path(), "[server]\nport = \"ninety\"\n").unwrap();
    assert!(matches!(
        StreamerConfig::load_from_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_loaded_values_are_validated_separately() {
    let file = tempfile::NamedTempFile::new().unwrap();
    fs::write(file.path(), "[capture]\nwidth = 641\n").unwrap();

    let config = StreamerConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.capture.width, 641);
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_default_file_name() {
    assert_eq!(
        StreamerConfig::default_path().to_str(),
        Some("crabcast.toml")
    );
}
