// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_capture::CaptureConfig;
use camera_capture::backends::camera::types::{Facing, PixelFormat, SensorRotation, Size};
use camera_capture::errors::CaptureError;

#[test]
fn test_config_default() {
    let config = CaptureConfig::default();

    assert_eq!(config.target_size(), Size::new(720, 1280));
    assert_eq!((config.min_preview_fps, config.max_preview_fps), (5, 30));
    assert!(
        config.raw_buffer_delivery,
        "Raw buffer delivery should be enabled by default"
    );
    assert_eq!(config.preview_format, PixelFormat::NV21);
    assert_eq!(config.initial_facing, Facing::Front);
    assert!(config.snapshot_dir.is_none());
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = CaptureConfig {
        target_width: 1080,
        target_height: 1920,
        initial_facing: Facing::Back,
        display_rotation: SensorRotation::Rotate270,
        snapshot_dir: Some(dir.path().join("shots")),
        ..CaptureConfig::default()
    };
    config.save(&path).unwrap();

    let loaded = CaptureConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.snapshot_dir(), dir.path().join("shots"));
}

#[test]
fn test_config_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        CaptureConfig::load(&path),
        Err(CaptureError::Config(_))
    ));
}

#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        CaptureConfig::load(&dir.path().join("absent.json")),
        Err(CaptureError::Io(_))
    ));
}

#[test]
fn test_config_default_path() {
    if let Some(path) = CaptureConfig::default_path() {
        assert!(path.ends_with("camera-capture/config.json"));
    }
}
