// SPDX-License-Identifier: GPL-3.0-only

//! The single open camera and its preview state
//!
//! `CameraDevice` wraps a [`CameraHandle`] with a small state machine:
//!
//! ```text
//!   Closed ──open──▶ Open ──start_preview──▶ Previewing
//!     ▲               │  ◀──stop_preview───     │
//!     └───release─────┴─────────release─────────┘
//! ```
//!
//! Opening while already open releases the current camera first. The device
//! knows nothing about GPU state; it only writes into the surface it is given.

use super::types::{
    CameraInfo, CameraParameters, Facing, FlashMode, FocusMode, PixelFormat, RawFrameHandler,
    SensorRotation, Size,
};
use super::{CameraHandle, CameraHardware};
use crate::constants::device_defaults;
use crate::errors::{CaptureError, CaptureResult};
use crate::pipeline::orientation::adjust_direction_code;
use crate::pipeline::size::select_closest_size;
use crate::pipeline::surface::SurfaceTexture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle state of a [`CameraDevice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Open,
    Previewing,
}

/// Owner of at most one open camera
pub struct CameraDevice {
    hardware: Arc<dyn CameraHardware>,
    handle: Option<Box<dyn CameraHandle>>,
    index: Option<usize>,
    state: DeviceState,
    preview_size: Option<Size>,
    preview_format: PixelFormat,
}

impl CameraDevice {
    pub fn new(hardware: Arc<dyn CameraHardware>) -> Self {
        Self {
            hardware,
            handle: None,
            index: None,
            state: DeviceState::Closed,
            preview_size: None,
            preview_format: PixelFormat::default(),
        }
    }

    pub fn hardware(&self) -> &Arc<dyn CameraHardware> {
        &self.hardware
    }

    pub fn number_of_cameras(&self) -> usize {
        self.hardware.number_of_cameras()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != DeviceState::Closed
    }

    /// Index of the open camera
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Static info of the open camera
    pub fn info(&self) -> Option<&CameraInfo> {
        self.handle.as_ref().map(|h| h.info())
    }

    pub fn facing(&self) -> Option<Facing> {
        self.info().map(|info| info.facing)
    }

    pub fn sensor_orientation(&self) -> Option<SensorRotation> {
        self.info().map(|info| info.orientation)
    }

    /// Negotiated preview size, once applied
    pub fn preview_size(&self) -> Option<Size> {
        self.preview_size
    }

    pub fn preview_format(&self) -> PixelFormat {
        self.preview_format
    }

    /// Open the camera at `index`, releasing any camera that is open
    ///
    /// Default parameters are applied right after opening; a device that
    /// refuses them stays open with its own defaults.
    pub fn open(&mut self, index: usize) -> CaptureResult<()> {
        self.release();

        let handle = self.hardware.open(index).map_err(|e| {
            warn!(index, error = %e, "Failed to open camera");
            match e {
                CaptureError::DeviceUnavailable(_) => e,
                other => CaptureError::DeviceUnavailable(other.to_string()),
            }
        })?;

        info!(
            index,
            name = %handle.info().name,
            facing = %handle.info().facing,
            orientation = %handle.info().orientation,
            backend = %self.hardware.backend_type(),
            "Camera opened"
        );

        self.handle = Some(handle);
        self.index = Some(index);
        self.state = DeviceState::Open;
        self.apply_default_parameters();
        Ok(())
    }

    /// Stop preview, detach the raw callback and release the hardware
    ///
    /// Safe to call in any state; a closed device is left untouched.
    pub fn release(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        if self.state == DeviceState::Previewing {
            handle.stop_preview();
        }
        handle.set_preview_callback_with_buffer(None);
        handle.release();

        info!(index = ?self.index, "Camera released");
        self.index = None;
        self.state = DeviceState::Closed;
        self.preview_size = None;
    }

    /// Current device parameters
    pub fn parameters(&self) -> CaptureResult<CameraParameters> {
        self.handle()?.parameters()
    }

    /// Supported preview sizes, empty when they cannot be queried
    pub fn supported_preview_sizes(&self) -> Vec<Size> {
        match self.parameters() {
            Ok(params) => params.supported_preview_sizes,
            Err(e) => {
                warn!(error = %e, "Failed to query preview sizes");
                Vec::new()
            }
        }
    }

    /// Apply the supported preview size closest to `target`
    ///
    /// A device reporting no sizes gets `target` verbatim. The size the
    /// device was asked to use is returned and remembered for buffer
    /// allocation, even if the device then rejects it.
    pub fn negotiate_and_apply_resolution(&mut self, target: Size) -> Size {
        let supported = self.supported_preview_sizes();
        let chosen = match select_closest_size(&supported, target) {
            Ok(size) => size,
            Err(e) => {
                warn!(%target, error = %e, "Using requested preview size as-is");
                target
            }
        };

        self.update_parameters("preview size", |params| {
            params.preview_size = chosen;
        });

        if let Ok(params) = self.parameters() {
            self.preview_format = params.preview_format;
        }

        debug!(%target, negotiated = %chosen, "Preview size negotiated");
        self.preview_size = Some(chosen);
        chosen
    }

    /// Request a raw preview pixel layout; unsupported layouts are logged
    /// and the device keeps its current one
    pub fn set_preview_format(&mut self, format: PixelFormat) -> bool {
        let supported = self
            .parameters()
            .map(|params| params.supported_preview_formats.contains(&format))
            .unwrap_or(false);
        if !supported {
            debug!(?format, current = ?self.preview_format, "Preview format not offered");
            return false;
        }

        let applied = self.update_parameters("preview format", |params| {
            params.preview_format = format;
        });
        if applied {
            self.preview_format = format;
        }
        applied
    }

    /// Clamp the preview frame-rate range into `[min_hz, max_hz]`
    ///
    /// Returns whether the clamped range is in effect. On rejection the
    /// previous range stays.
    pub fn clamp_preview_frame_rate(&mut self, min_hz: u32, max_hz: u32) -> bool {
        let params = match self.parameters() {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "Cannot read frame-rate range");
                return false;
            }
        };

        let native = params.preview_fps_range;
        let Some(clamped) = native.clamp_hz(min_hz, max_hz) else {
            warn!(%native, min_hz, max_hz, "Native frame-rate range outside bounds");
            return false;
        };

        let applied = self.update_parameters("frame rate", |params| {
            params.preview_fps_range = clamped;
        });
        if applied {
            debug!(%native, %clamped, "Preview frame rate clamped");
        }
        applied
    }

    /// Bind preview output to `surface` and start streaming
    ///
    /// With `raw_sink`, raw frames are also delivered into buffers sized for
    /// the negotiated preview size and format. A bind failure leaves the
    /// device open without preview.
    pub fn start_preview(
        &mut self,
        surface: Arc<SurfaceTexture>,
        raw_sink: Option<RawFrameHandler>,
    ) -> CaptureResult<()> {
        if self.state == DeviceState::Previewing {
            self.stop_preview();
        }

        let buffer_len = self.raw_buffer_len();
        let handle = self.handle_mut()?;
        handle.set_preview_texture(surface)?;

        match raw_sink {
            Some(sink) => {
                handle.set_preview_callback_with_buffer(Some(sink));
                for _ in 0..device_defaults::CALLBACK_BUFFER_COUNT {
                    handle.add_callback_buffer(vec![0u8; buffer_len]);
                }
            }
            None => handle.set_preview_callback_with_buffer(None),
        }

        if let Err(e) = handle.start_preview() {
            handle.set_preview_callback_with_buffer(None);
            return Err(match e {
                CaptureError::PreviewBindError(_) => e,
                other => CaptureError::PreviewBindError(other.to_string()),
            });
        }

        self.state = DeviceState::Previewing;
        info!(
            size = ?self.preview_size,
            format = ?self.preview_format,
            buffer_len,
            "Preview started"
        );
        Ok(())
    }

    pub fn stop_preview(&mut self) {
        if self.state != DeviceState::Previewing {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.stop_preview();
            handle.set_preview_callback_with_buffer(None);
        }
        self.state = DeviceState::Open;
        debug!("Preview stopped");
    }

    /// Bytes needed for one raw preview frame
    pub fn raw_buffer_len(&self) -> usize {
        self.preview_size
            .map(|size| self.preview_format.frame_size(size))
            .unwrap_or(0)
    }

    /// Switch the torch on or off; failures are logged and ignored
    pub fn set_torch(&mut self, enabled: bool) {
        let mode = if enabled {
            FlashMode::Torch
        } else {
            FlashMode::Off
        };
        if self.handle.is_none() {
            debug!(enabled, "No camera open, torch request ignored");
            return;
        }
        self.update_parameters("torch", |params| {
            params.flash_mode = Some(mode);
        });
    }

    /// Whether the open camera supports torch mode
    pub fn is_torch_available(&self) -> bool {
        self.parameters()
            .map(|params| params.supported_flash_modes.contains(&FlashMode::Torch))
            .unwrap_or(false)
    }

    /// Set the rotation recorded in captured pictures
    pub fn set_rotation(&mut self, degrees: u32) {
        self.update_parameters("rotation", |params| {
            params.rotation = degrees % 360;
        });
    }

    /// Whether preview content must be mirrored (front-facing camera)
    pub fn needs_mirror(&self) -> bool {
        self.facing() == Some(Facing::Front)
    }

    /// Direction code for raw-buffer consumers, corrected for sensor mounting
    pub fn direction_code(&self, dir: u32) -> u32 {
        match self.info() {
            Some(info) => adjust_direction_code(info.facing, info.orientation, dir),
            None => dir,
        }
    }

    /// Continuous focus, flash off, 640x480 preview and the preferred
    /// picture size, each only where supported
    pub fn apply_default_parameters(&mut self) {
        let Ok(params) = self.parameters() else {
            return;
        };
        debug!(parameters = %params.flatten(), "Camera parameters on open");

        self.update_parameters("defaults", |params| {
            if params
                .supported_focus_modes
                .contains(&FocusMode::ContinuousPicture)
            {
                params.focus_mode = Some(FocusMode::ContinuousPicture);
            }
            if params.supported_flash_modes.contains(&FlashMode::Off) {
                params.flash_mode = Some(FlashMode::Off);
            }
            if params
                .supported_preview_sizes
                .contains(&device_defaults::PREVIEW_SIZE)
            {
                params.preview_size = device_defaults::PREVIEW_SIZE;
            }
            if params
                .supported_picture_sizes
                .contains(&device_defaults::PREFERRED_PICTURE_SIZE)
            {
                params.picture_size = device_defaults::PREFERRED_PICTURE_SIZE;
            } else if let Some(widest) = params
                .supported_picture_sizes
                .iter()
                .copied()
                .max_by_key(|size| size.width)
            {
                params.picture_size = widest;
            }
        });
    }

    /// Read-modify-write the device parameters, absorbing failures
    fn update_parameters(&mut self, what: &str, edit: impl FnOnce(&mut CameraParameters)) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };

        let mut params = match handle.parameters() {
            Ok(params) => params,
            Err(e) => {
                warn!(what, error = %e, "Failed to read camera parameters");
                return false;
            }
        };
        edit(&mut params);

        match handle.set_parameters(&params) {
            Ok(()) => true,
            Err(e) => {
                warn!(what, error = %e, "Camera rejected parameters");
                false
            }
        }
    }

    fn handle(&self) -> CaptureResult<&dyn CameraHandle> {
        self.handle
            .as_deref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no camera open".into()))
    }

    fn handle_mut(&mut self) -> CaptureResult<&mut Box<dyn CameraHandle>> {
        self.handle
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no camera open".into()))
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraDevice")
            .field("backend", &self.hardware.backend_type())
            .field("index", &self.index)
            .field("state", &self.state)
            .field("preview_size", &self.preview_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{FpsRange, RawFrame};
    use crate::backends::camera::virtual_camera::{Faults, VirtualCameraModel, VirtualHardware};
    use crate::pipeline::surface::TextureId;

    fn phone() -> (Arc<VirtualHardware>, CameraDevice) {
        let hw = Arc::new(VirtualHardware::phone().manual_delivery());
        let device = CameraDevice::new(hw.clone());
        (hw, device)
    }

    #[test]
    fn test_open_applies_defaults() {
        let (hw, mut device) = phone();
        device.open(0).unwrap();
        assert_eq!(device.state(), DeviceState::Open);

        let params = device.parameters().unwrap();
        assert_eq!(params.focus_mode, Some(FocusMode::ContinuousPicture));
        assert_eq!(params.flash_mode, Some(FlashMode::Off));
        assert_eq!(params.preview_size, device_defaults::PREVIEW_SIZE);
        assert_eq!(params.picture_size, device_defaults::PREFERRED_PICTURE_SIZE);
        assert_eq!(hw.probe().open_indices(), vec![0]);
    }

    #[test]
    fn test_widest_picture_size_when_preferred_missing() {
        let (_hw, mut device) = phone();
        device.open(1).unwrap();
        let params = device.parameters().unwrap();
        let widest = params
            .supported_picture_sizes
            .iter()
            .map(|s| s.width)
            .max()
            .unwrap();
        assert_eq!(params.picture_size.width, widest);
    }

    #[test]
    fn test_open_replaces_previous_camera() {
        let (hw, mut device) = phone();
        device.open(0).unwrap();
        device.open(1).unwrap();
        assert_eq!(device.index(), Some(1));
        assert_eq!(hw.probe().open_indices(), vec![1]);
    }

    #[test]
    fn test_open_failure_leaves_closed() {
        let (hw, mut device) = phone();
        device.open(0).unwrap();
        hw.set_faults(Faults {
            fail_open: true,
            ..Faults::default()
        });
        assert!(matches!(
            device.open(1),
            Err(CaptureError::DeviceUnavailable(_))
        ));
        assert_eq!(device.state(), DeviceState::Closed);
        assert!(hw.probe().open_indices().is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let (hw, mut device) = phone();
        device.release();
        device.open(0).unwrap();
        device.release();
        device.release();
        assert_eq!(device.state(), DeviceState::Closed);
        assert!(hw.probe().open_indices().is_empty());
    }

    #[test]
    fn test_negotiation_falls_back_to_target() {
        let model = VirtualCameraModel::new("bare", Facing::Back, SensorRotation::None)
            .with_preview_sizes(Vec::new());
        let hw = Arc::new(VirtualHardware::new(vec![model]).manual_delivery());
        let mut device = CameraDevice::new(hw);
        device.open(0).unwrap();

        let target = Size::new(1234, 567);
        assert_eq!(device.negotiate_and_apply_resolution(target), target);
        assert_eq!(device.preview_size(), Some(target));
    }

    #[test]
    fn test_negotiation_picks_closest() {
        let (_hw, mut device) = phone();
        device.open(0).unwrap();
        let chosen = device.negotiate_and_apply_resolution(Size::new(1280, 700));
        assert_eq!(chosen, Size::new(1280, 720));
        assert_eq!(device.parameters().unwrap().preview_size, chosen);
    }

    #[test]
    fn test_frame_rate_clamped() {
        let (_hw, mut device) = phone();
        device.open(0).unwrap();
        assert!(device.clamp_preview_frame_rate(5, 30));
        assert_eq!(
            device.parameters().unwrap().preview_fps_range,
            FpsRange::new(5000, 30000)
        );
    }

    #[test]
    fn test_frame_rate_rejection_keeps_previous_range() {
        let (hw, mut device) = phone();
        device.open(0).unwrap();
        let before = device.parameters().unwrap().preview_fps_range;
        hw.set_faults(Faults {
            reject_fps: true,
            ..Faults::default()
        });
        assert!(!device.clamp_preview_frame_rate(5, 30));
        assert_eq!(device.parameters().unwrap().preview_fps_range, before);
    }

    #[test]
    fn test_bind_failure_stays_open() {
        let (hw, mut device) = phone();
        device.open(0).unwrap();
        device.negotiate_and_apply_resolution(Size::new(1280, 720));
        hw.set_faults(Faults {
            fail_bind: true,
            ..Faults::default()
        });
        let surface = Arc::new(SurfaceTexture::new(TextureId(1)));
        assert!(matches!(
            device.start_preview(surface, None),
            Err(CaptureError::PreviewBindError(_))
        ));
        assert_eq!(device.state(), DeviceState::Open);
    }

    #[test]
    fn test_raw_buffer_preallocated() {
        let (hw, mut device) = phone();
        device.open(0).unwrap();
        let size = device.negotiate_and_apply_resolution(Size::new(640, 480));
        let surface = Arc::new(SurfaceTexture::new(TextureId(1)));
        let sink: RawFrameHandler = Arc::new(|_frame: RawFrame| {});
        device.start_preview(surface, Some(sink)).unwrap();

        assert_eq!(device.state(), DeviceState::Previewing);
        let pool = hw.probe().buffer_pool().unwrap();
        assert_eq!(pool.available(), device_defaults::CALLBACK_BUFFER_COUNT);
        let buffer = pool.take().unwrap();
        assert_eq!(buffer.len(), size.pixel_count() * 12 / 8);
    }

    #[test]
    fn test_torch() {
        let (_hw, mut device) = phone();
        device.open(0).unwrap();
        assert!(device.is_torch_available());
        device.set_torch(true);
        assert_eq!(
            device.parameters().unwrap().flash_mode,
            Some(FlashMode::Torch)
        );
        device.set_torch(false);
        assert_eq!(
            device.parameters().unwrap().flash_mode,
            Some(FlashMode::Off)
        );

        // Front camera has no flash; the request is swallowed
        device.open(1).unwrap();
        assert!(!device.is_torch_available());
        device.set_torch(true);
        assert_ne!(
            device.parameters().unwrap().flash_mode,
            Some(FlashMode::Torch)
        );
    }

    #[test]
    fn test_mirror_and_direction_code() {
        let (_hw, mut device) = phone();
        device.open(1).unwrap();
        assert!(device.needs_mirror());
        // Front sensor mounted at 270: odd codes flip
        assert_eq!(device.direction_code(1), 3);
        assert_eq!(device.direction_code(0), 0);

        device.open(0).unwrap();
        assert!(!device.needs_mirror());
        assert_eq!(device.direction_code(1), 1);
    }

    #[test]
    fn test_set_rotation() {
        let (_hw, mut device) = phone();
        device.open(0).unwrap();
        device.set_rotation(450);
        assert_eq!(device.parameters().unwrap().rotation, 90);
    }
}
