// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use invariance::Config;
use invariance::constants::{capture, transform, viewer};
use invariance::errors::ConfigError;
use std::path::PathBuf;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.alpha, transform::DEFAULT_ALPHA);
    assert!(config.invariance_enabled, "Invariance should be on by default");
    assert_eq!(config.camera_device, capture::DEFAULT_DEVICE);
    assert!(config.fallback_image.is_none());
    assert!(config.alias_capacity >= 1);
}

#[test]
fn test_viewer_starts_on_still_image_by_default() {
    let config = Config::default();
    assert!(!config.start_live, "Camera should only start on request");
    assert_eq!(config.start_live, viewer::DEFAULT_START_LIVE);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "alpha": 0.5 }"#).unwrap();
    assert!(!Config::load_from(&path).unwrap().start_live);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config {
        alpha: 0.3,
        invariance_enabled: false,
        start_live: true,
        camera_device: "/dev/video2".to_string(),
        fallback_image: Some(PathBuf::from("/tmp/still.png")),
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "alpha": 0.6 }"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.alpha, 0.6);
    assert_eq!(config.capture_width, capture::DEFAULT_WIDTH);
}

#[test]
fn test_invalid_json_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Config::load_from(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_loaded_values_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "alpha": 3.5, "alias_capacity": 0, "capture_width": 0 }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.alpha, 1.0);
    assert_eq!(config.alias_capacity, 1);
    assert_eq!(config.capture_width, capture::DEFAULT_WIDTH);
    assert_eq!(config.capture_height, capture::DEFAULT_HEIGHT);
}

#[test]
fn test_transform_parameters_follow_config() {
    let config = Config {
        alpha: 0.25,
        invariance_enabled: false,
        ..Config::default()
    };
    let params = config.transform_parameters();
    assert_eq!(params.alpha, 0.25);
    assert!(!params.invariance_enabled);
}
