// SPDX-License-Identifier: GPL-3.0-only

//! Consumer hooks: texture post-processing and raw preview frames

use crate::backends::camera::types::{PixelFormat, Size};
use crate::pipeline::surface::{TextureId, TransformMatrix};

/// Error returned by a preview consumer; logged and otherwise ignored
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync>;

/// One camera texture about to be drawn
#[derive(Debug)]
pub struct TextureFrame<'a> {
    pub texture_id: TextureId,
    /// Capture size, in display orientation
    pub size: Size,
    pub transform: TransformMatrix,
    /// Buffer set with `set_preprocess_buffer`, for CPU read-back
    pub output: Option<&'a mut [u8]>,
}

/// Hook into the render loop, for effects that replace the camera texture
pub trait SurfaceTextureCallback: Send {
    /// Called once per surface change with the negotiated capture size
    fn on_surface_created(&mut self, size: Size);

    /// Called once per drawn frame; returns the texture to draw instead
    fn process_texture(&mut self, frame: TextureFrame<'_>) -> TextureId;
}

/// A raw preview buffer as handed to consumers
#[derive(Debug, Clone, Copy)]
pub struct PreviewFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Sensor mounting angle of the camera that captured the frame, in degrees
    pub rotation: u32,
    /// [`PixelFormat::code`] of `data`
    pub format_code: i32,
    pub timestamp_ns: u64,
}

impl PreviewFrame<'_> {
    pub fn format(&self) -> Option<PixelFormat> {
        PixelFormat::from_code(self.format_code)
    }
}

/// Receives every raw preview frame (encoders, analysers)
///
/// Runs on the camera's delivery thread and must not block: the buffer goes
/// back to the camera only when the call returns, and the next frame is
/// dropped until it does. Consumers doing real work (encoding, upload)
/// copy `data` and hand it to their own thread or bounded queue. Calls
/// exceeding [`PREVIEW_CONSUMER_BUDGET`] are logged and counted in
/// [`CapturePipeline::slow_preview_frames`].
///
/// [`PREVIEW_CONSUMER_BUDGET`]: crate::constants::timing::PREVIEW_CONSUMER_BUDGET
/// [`CapturePipeline::slow_preview_frames`]: crate::pipeline::CapturePipeline::slow_preview_frames
pub trait PreviewCallback: Send + Sync {
    fn on_preview_frame(&self, frame: &PreviewFrame<'_>) -> Result<(), ConsumerError>;
}

impl<F> PreviewCallback for F
where
    F: Fn(&PreviewFrame<'_>) -> Result<(), ConsumerError> + Send + Sync,
{
    fn on_preview_frame(&self, frame: &PreviewFrame<'_>) -> Result<(), ConsumerError> {
        self(frame)
    }
}
