// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use crate::backends::camera::types::Size;
use std::time::Duration;

/// Target resolution defaults (portrait, display coordinates)
pub mod target {
    /// Default requested width
    pub const DEFAULT_WIDTH: u32 = 720;

    /// Default requested height
    pub const DEFAULT_HEIGHT: u32 = 1280;
}

/// Preview frame rate bounds
pub mod frame_rate {
    /// Lower bound applied when clamping the device frame-rate range (Hz)
    pub const MIN_PREVIEW_FPS: u32 = 5;

    /// Upper bound applied when clamping the device frame-rate range (Hz)
    pub const MAX_PREVIEW_FPS: u32 = 30;

    /// Frame-rate ranges are expressed in frames per 1000 seconds
    pub const FPS_SCALE: u32 = 1000;
}

/// Device parameter defaults applied right after opening a camera
pub mod device_defaults {
    use super::Size;

    /// Preview size applied on open, before negotiation runs
    pub const PREVIEW_SIZE: Size = Size::new(640, 480);

    /// Preferred full-resolution picture size
    pub const PREFERRED_PICTURE_SIZE: Size = Size::new(4608, 3456);

    /// Number of raw callback buffers queued on preview start
    pub const CALLBACK_BUFFER_COUNT: usize = 1;
}

/// Common capture sizes offered by devices that only report a stepwise range
pub const STEPWISE_CANDIDATE_SIZES: &[(u32, u32)] = &[
    (1920, 1080),
    (1280, 720),
    (960, 540),
    (800, 600),
    (640, 480),
    (320, 240),
];

/// Debug snapshot settings
pub mod snapshot {
    /// JPEG quality for debug texture snapshots
    pub const JPEG_QUALITY: u8 = 90;

    /// Sub-directory used when no snapshot directory is configured
    pub const DEFAULT_SUBDIR: &str = "camera-capture";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Interval between synthetic frames from the virtual camera (~30 fps)
    pub const VIRTUAL_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Number of V4L2 mmap buffers requested per stream
    pub const V4L2_BUFFER_COUNT: u32 = 4;

    /// Longest a preview consumer may hold the delivery thread before it is
    /// reported as slow
    pub const PREVIEW_CONSUMER_BUDGET: Duration = Duration::from_millis(20);

    /// Pause after a failed V4L2 dequeue before retrying
    pub const V4L2_RETRY_DELAY: Duration = Duration::from_millis(33);

    /// Consecutive failed dequeues after which the capture loop gives up
    pub const V4L2_MAX_CONSECUTIVE_ERRORS: u32 = 30;
}
