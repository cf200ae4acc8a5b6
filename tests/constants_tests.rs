// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camera_capture::backends::camera::types::{FpsRange, Size};
use camera_capture::constants::{
    STEPWISE_CANDIDATE_SIZES, device_defaults, frame_rate, snapshot, target, timing,
};

#[test]
fn test_default_target_is_portrait() {
    assert!(target::DEFAULT_HEIGHT > target::DEFAULT_WIDTH);
}

#[test]
fn test_frame_rate_bounds() {
    assert!(frame_rate::MIN_PREVIEW_FPS < frame_rate::MAX_PREVIEW_FPS);
    assert_eq!(
        FpsRange::from_hz(frame_rate::MIN_PREVIEW_FPS, frame_rate::MAX_PREVIEW_FPS),
        FpsRange::new(5000, 30000)
    );
}

#[test]
fn test_device_defaults() {
    assert_eq!(device_defaults::PREVIEW_SIZE, Size::new(640, 480));
    assert_eq!(
        device_defaults::PREFERRED_PICTURE_SIZE,
        Size::new(4608, 3456)
    );
    assert!(device_defaults::CALLBACK_BUFFER_COUNT >= 1);
}

#[test]
fn test_stepwise_candidates_descend() {
    // Largest first so stepwise devices list sizes like discrete ones
    let areas: Vec<u32> = STEPWISE_CANDIDATE_SIZES.iter().map(|(w, h)| w * h).collect();
    assert!(
        areas.windows(2).all(|pair| pair[0] > pair[1]),
        "Candidate sizes should be ordered from largest to smallest"
    );
}

#[test]
fn test_snapshot_quality() {
    assert_eq!(snapshot::JPEG_QUALITY, 90);
    assert!(!snapshot::DEFAULT_SUBDIR.is_empty());
}

#[test]
fn test_consumer_budget_fits_in_a_frame() {
    let frame = std::time::Duration::from_secs(1) / frame_rate::MAX_PREVIEW_FPS;
    assert!(timing::PREVIEW_CONSUMER_BUDGET < frame);
}

#[test]
fn test_capture_gives_up_after_about_a_second() {
    let total = timing::V4L2_RETRY_DELAY * timing::V4L2_MAX_CONSECUTIVE_ERRORS;
    assert!(total >= std::time::Duration::from_millis(500));
    assert!(total <= std::time::Duration::from_secs(2));
}
