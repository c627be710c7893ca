//! Tests for layered configuration loading

use std::fs;

use playlist_history::config::AppConfig;
use playlist_history::Granularity;
use tempfile::tempdir;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.pipeline.granularity, "day");
    assert_eq!(config.pipeline.output_directory, "./output");
    assert!(!config.pipeline.concurrent_log_builders);
    assert_eq!(config.database.url, "data/playlists.db");
    assert!(config.database.enabled);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_load_without_files_uses_defaults() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = AppConfig::load_from(temp_dir.path()).expect("Failed to load configuration");
    assert_eq!(config.pipeline.output_directory, "./output");
    assert_eq!(config.granularity().ok(), Some(Granularity::Day));
}

#[test]
fn test_local_file_overrides_default_file() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_dir = temp_dir.path().join("config");
    fs::create_dir_all(&config_dir).expect("Failed to create config directory");
    fs::write(
        config_dir.join("default.toml"),
        "[pipeline]\noutput_directory = \"from-default\"\n\n[logging]\nlevel = \"debug\"\n",
    )
    .expect("Failed to write default.toml");
    fs::write(config_dir.join("local.toml"), "[pipeline]\noutput_directory = \"from-local\"\n")
        .expect("Failed to write local.toml");

    let config = AppConfig::load_from(temp_dir.path()).expect("Failed to load configuration");
    assert_eq!(config.pipeline.output_directory, "from-local");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.database.url, "data/playlists.db");
}

#[test]
fn test_invalid_file_value_is_rejected() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    fs::write(temp_dir.path().join("config.toml"), "[pipeline]\ngranularity = \"week\"\n")
        .expect("Failed to write config.toml");
    assert!(AppConfig::load_from(temp_dir.path()).is_err());
}

#[test]
fn test_config_validation_invalid_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_invalid_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_empty_output_directory() {
    let mut config = AppConfig::default();
    config.pipeline.output_directory = "  ".to_string();
    assert!(config.validate().is_err());
}
