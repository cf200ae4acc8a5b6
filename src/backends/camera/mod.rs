// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! Hardware access goes through two traits:
//!
//! ```text
//! ┌─────────────────────┐
//! │   CapturePipeline   │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    CameraDevice     │  ← Closed / Open / Previewing state machine
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   CameraHardware    │  ← enumeration, open
//! │   CameraHandle      │  ← one open camera
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐  ┌─────────┐
//!   │ V4L2 │  │ Virtual │
//!   └──────┘  └─────────┘
//! ```

pub mod device;
pub mod format_converters;
pub mod frame_loop;
pub mod types;
pub mod v4l2;
pub mod virtual_camera;

pub use device::{CameraDevice, DeviceState};
pub use types::*;

use crate::errors::CaptureResult;
use crate::pipeline::surface::SurfaceTexture;
use std::sync::Arc;

/// Camera enumeration and opening for one platform
pub trait CameraHardware: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> CaptureBackendType;

    /// Number of cameras that can be opened by index
    fn number_of_cameras(&self) -> usize;

    /// Facing and sensor orientation of the camera at `index`
    fn camera_info(&self, index: usize) -> CaptureResult<CameraInfo>;

    /// Acquire exclusive access to the camera at `index`
    ///
    /// # Returns
    /// * `Ok(handle)` - Camera opened
    /// * `Err(CaptureError::DeviceUnavailable)` - Busy, absent, or permission denied
    fn open(&self, index: usize) -> CaptureResult<Box<dyn CameraHandle>>;
}

/// An open camera
///
/// All methods are called from the pipeline's render-loop context. Frames are
/// delivered from a backend-owned thread into the preview texture and, when a
/// preview callback is installed, into buffers queued with
/// [`CameraHandle::add_callback_buffer`].
pub trait CameraHandle: Send {
    fn info(&self) -> &CameraInfo;

    /// Current parameters
    fn parameters(&self) -> CaptureResult<CameraParameters>;

    /// Apply parameters
    ///
    /// Fails with `ParameterRejected` if any value is refused; the previous
    /// parameters then remain in effect.
    fn set_parameters(&mut self, params: &CameraParameters) -> CaptureResult<()>;

    /// Route preview frames into `surface`
    ///
    /// Fails with `PreviewBindError` if the surface cannot be used.
    fn set_preview_texture(&mut self, surface: Arc<SurfaceTexture>) -> CaptureResult<()>;

    /// Install or remove the raw frame receiver
    fn set_preview_callback_with_buffer(&mut self, handler: Option<RawFrameHandler>);

    /// Queue a buffer for raw frame delivery
    fn add_callback_buffer(&mut self, buffer: Vec<u8>);

    fn start_preview(&mut self) -> CaptureResult<()>;

    fn stop_preview(&mut self);

    /// Release the hardware; the handle is unusable afterwards
    fn release(&mut self);
}

/// Get the camera hardware for a backend type
pub fn get_hardware(backend_type: CaptureBackendType) -> Arc<dyn CameraHardware> {
    match backend_type {
        CaptureBackendType::V4l2 => Arc::new(v4l2::V4l2Hardware::discover()),
        CaptureBackendType::Virtual => Arc::new(virtual_camera::VirtualHardware::phone()),
    }
}
