// Config persistence tests
// Round trips through JSON and TOML files and format selection.

use camreg_settings::{Config, SettingsError};
use tempfile::TempDir;

#[test]
fn test_toml_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.registration.validation_tolerance = 0.25;
    config.events.enable_history = true;
    config.save_to_file(&path).expect("save");

    let loaded = Config::load_from_file(&path).expect("load");
    assert_eq!(loaded, config);
}

#[test]
fn test_json_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.events.broker_name = "bench".to_string();
    config.save_to_file(&path).expect("save");

    let loaded = Config::load_from_file(&path).expect("load");
    assert_eq!(loaded.events.broker_name, "bench");
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("config.yaml");
    let err = Config::default().save_to_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::UnsupportedFormat(ext) if ext == "yaml"));
}

#[test]
fn test_load_or_default_missing_file() {
    let dir = TempDir::new().expect("temp dir");
    let config = Config::load_or_default(&dir.path().join("absent.toml")).expect("defaults");
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_file_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[registration]\nvalidation_tolerance = -1.0\n").expect("write");

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidSetting { .. }));
}

#[test]
fn test_default_path_location() {
    if let Ok(path) = Config::default_path() {
        assert!(path.ends_with("camreg/config.toml"));
    }
}
