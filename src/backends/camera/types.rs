// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::constants::frame_rate::FPS_SCALE;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CaptureBackendType {
    /// Video4Linux2 devices under /dev/video*
    #[default]
    V4l2,
    /// Synthetic test-pattern cameras
    Virtual,
}

impl std::fmt::Display for CaptureBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureBackendType::V4l2 => write!(f, "V4L2"),
            CaptureBackendType::Virtual => write!(f, "virtual"),
        }
    }
}

/// Which way a camera points
///
/// The numeric value doubles as the conventional device index: the back
/// camera is index 0 and the front camera index 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Facing {
    /// Points away from the user
    Back,
    /// Points toward the user (selfie camera)
    #[default]
    Front,
}

impl Facing {
    /// Conventional device index for this facing
    pub fn index(self) -> usize {
        match self {
            Facing::Back => 0,
            Facing::Front => 1,
        }
    }

    /// Facing implied by a device index (anything but 1 is treated as back)
    pub fn from_index(index: usize) -> Self {
        if index == 1 {
            Facing::Front
        } else {
            Facing::Back
        }
    }

    /// The other facing
    pub fn opposite(self) -> Self {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Back => write!(f, "back"),
            Facing::Front => write!(f, "front"),
        }
    }
}

/// Rotation in degrees (clockwise), restricted to quarter turns
///
/// Used both for the fixed mounting angle of a sensor and for the current
/// rotation of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SensorRotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// All quarter-turn rotations in ascending order
    pub const ALL: [SensorRotation; 4] = [
        SensorRotation::None,
        SensorRotation::Rotate90,
        SensorRotation::Rotate180,
        SensorRotation::Rotate270,
    ];

    /// Create rotation from an integer degree value (normalised to 0-360).
    /// Values that are not a quarter turn map to no rotation.
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, SensorRotation::Rotate90 | SensorRotation::Rotate270)
    }

    /// Quarter-turn code (0=None, 1=90CW, 2=180, 3=270CW)
    pub fn quarter_turns(&self) -> u32 {
        self.degrees() / 90
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// A width × height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same size with width and height exchanged
    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Preview frame-rate range in frames per 1000 seconds (30 fps = 30000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Range covering exactly `min_hz..=max_hz` whole frames per second
    pub fn from_hz(min_hz: u32, max_hz: u32) -> Self {
        Self::new(min_hz * FPS_SCALE, max_hz * FPS_SCALE)
    }

    /// Intersect with `[min_hz, max_hz]`; `None` when the ranges don't overlap
    pub fn clamp_hz(&self, min_hz: u32, max_hz: u32) -> Option<FpsRange> {
        let min = self.min.max(min_hz * FPS_SCALE);
        let max = self.max.min(max_hz * FPS_SCALE);
        (min <= max).then_some(FpsRange::new(min, max))
    }

    pub fn min_hz(&self) -> f64 {
        self.min as f64 / FPS_SCALE as f64
    }

    pub fn max_hz(&self) -> f64 {
        self.max as f64 / FPS_SCALE as f64
    }
}

impl Default for FpsRange {
    fn default() -> Self {
        Self::from_hz(30, 30)
    }
}

impl std::fmt::Display for FpsRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.min, self.max)
    }
}

/// Pixel layout of raw preview buffers
///
/// Codes match the platform image-format constants that raw-buffer consumers
/// (encoders in particular) expect alongside each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// NV21 - Semi-planar 4:2:0 (Y plane + interleaved VU plane)
    #[default]
    NV21,
    /// YV12 - Planar 4:2:0 (Y plane, then V, then U)
    YV12,
    /// NV16 - Semi-planar 4:2:2
    NV16,
    /// YUY2 - Packed 4:2:2 (Y0 U Y1 V interleaved, V4L2 "YUYV")
    YUY2,
    /// RGB565 - 16-bit packed RGB
    RGB565,
}

impl PixelFormat {
    /// All formats, in order of preference for raw preview delivery
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::NV21,
        PixelFormat::YV12,
        PixelFormat::NV16,
        PixelFormat::YUY2,
        PixelFormat::RGB565,
    ];

    /// Bits used per pixel, averaged over chroma subsampling
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::NV21 | PixelFormat::YV12 => 12,
            PixelFormat::NV16 | PixelFormat::YUY2 | PixelFormat::RGB565 => 16,
        }
    }

    /// Size in bytes of one frame of this format
    pub fn frame_size(&self, size: Size) -> usize {
        size.pixel_count() * self.bits_per_pixel() as usize / 8
    }

    /// Platform image-format code reported with raw frames
    pub fn code(&self) -> i32 {
        match self {
            PixelFormat::RGB565 => 0x04,
            PixelFormat::NV16 => 0x10,
            PixelFormat::NV21 => 0x11,
            PixelFormat::YUY2 => 0x14,
            PixelFormat::YV12 => 0x3231_5659,
        }
    }

    /// Reverse of [`PixelFormat::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.code() == code)
    }

    /// V4L2 FourCC for this layout
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::NV21 => *b"NV21",
            PixelFormat::YV12 => *b"YV12",
            PixelFormat::NV16 => *b"NV16",
            PixelFormat::YUY2 => *b"YUYV",
            PixelFormat::RGB565 => *b"RGBP",
        }
    }

    /// Parse a V4L2 FourCC
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|format| &format.fourcc() == fourcc)
    }
}

/// Flash LED operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlashMode {
    /// Flash LED is off
    Off,
    /// Flash fires when the scene is dark
    Auto,
    /// Flash fires during photo capture
    On,
    /// Torch / flashlight mode (LED stays on continuously)
    Torch,
}

/// Focus behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusMode {
    Auto,
    ContinuousPicture,
    ContinuousVideo,
    Fixed,
    Infinity,
}

/// Static facts about a camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Human-readable device name
    pub name: String,
    pub facing: Facing,
    /// Mounting angle of the sensor relative to the device's natural orientation
    pub orientation: SensorRotation,
}

/// Tunable parameters of an open camera
///
/// Obtained from [`super::CameraHandle::parameters`], modified, and written back
/// with [`super::CameraHandle::set_parameters`]. The device may refuse any
/// change with [`crate::errors::CaptureError::ParameterRejected`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub preview_size: Size,
    pub supported_preview_sizes: Vec<Size>,
    pub picture_size: Size,
    pub supported_picture_sizes: Vec<Size>,
    pub preview_format: PixelFormat,
    pub supported_preview_formats: Vec<PixelFormat>,
    pub preview_fps_range: FpsRange,
    pub supported_fps_ranges: Vec<FpsRange>,
    pub flash_mode: Option<FlashMode>,
    pub supported_flash_modes: Vec<FlashMode>,
    pub focus_mode: Option<FocusMode>,
    pub supported_focus_modes: Vec<FocusMode>,
    /// Rotation written into captured pictures, in degrees
    pub rotation: u32,
}

impl CameraParameters {
    /// Single-line JSON dump for debug logging
    pub fn flatten(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable: {}>", e))
    }
}

/// A preview frame written into a preview surface
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub size: Size,
    pub format: PixelFormat,
    /// Pixel data, shared so surfaces and renderers can hold it without copying
    pub data: Arc<[u8]>,
    /// Capture timestamp in nanoseconds on the backend's monotonic clock
    pub timestamp_ns: u64,
}

/// Pool of caller-provided buffers that raw preview frames are copied into
///
/// Backends take a buffer for every raw frame they deliver and drop the frame
/// when the pool is empty. Buffers come back through [`RawFrame`]'s `Drop`.
#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    buffers: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a buffer for the next raw frame
    pub fn add(&self, buffer: Vec<u8>) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.push_back(buffer);
        }
    }

    /// Take the oldest queued buffer
    pub fn take(&self) -> Option<Vec<u8>> {
        self.buffers.lock().ok()?.pop_front()
    }

    /// Number of buffers currently available
    pub fn available(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Drop all queued buffers
    pub fn clear(&self) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.clear();
        }
    }
}

/// A raw preview frame borrowed from a [`BufferPool`]
///
/// The buffer returns to its pool when the frame is dropped or recycled.
#[derive(Debug)]
pub struct RawFrame {
    data: Option<Vec<u8>>,
    pool: BufferPool,
    pub size: Size,
    pub format: PixelFormat,
    pub timestamp_ns: u64,
}

impl RawFrame {
    pub fn new(
        data: Vec<u8>,
        pool: BufferPool,
        size: Size,
        format: PixelFormat,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            data: Some(data),
            pool,
            size,
            format,
            timestamp_ns,
        }
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Return the buffer to its pool right away
    pub fn recycle(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.add(data);
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.give_back();
    }
}

/// Receiver for raw preview frames, called on the backend's delivery thread
pub type RawFrameHandler = Arc<dyn Fn(RawFrame) + Send + Sync>;
