// SPDX-License-Identifier: GPL-3.0-only

//! Video4Linux2 camera backend
//!
//! Cameras are the `/dev/video*` nodes that can capture in one of the
//! supported [`PixelFormat`]s. Facing and sensor mounting come from the
//! camera-class controls when the driver reports them; USB webcams that do
//! not are treated as front-facing and upright. Torch mode drives the sysfs
//! flash LEDs for back-facing cameras.
//!
//! Each preview runs a capture thread that owns its own mmap stream.

pub mod controls;

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::{
    BufferPool, CameraFrame, CameraInfo, CameraParameters, CaptureBackendType, Facing, FlashMode,
    FocusMode, FpsRange, PixelFormat, RawFrame, RawFrameHandler, SensorRotation, Size,
};
use super::{CameraHandle, CameraHardware};
use crate::constants::{STEPWISE_CANDIDATE_SIZES, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::flash::FlashHardware;
use crate::pipeline::surface::SurfaceTexture;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

#[derive(Debug, Clone)]
struct V4l2Camera {
    path: String,
    info: CameraInfo,
}

/// All capture-capable V4L2 devices on this machine
pub struct V4l2Hardware {
    cameras: Vec<V4l2Camera>,
    flash: Arc<FlashHardware>,
    open: Arc<Mutex<BTreeSet<usize>>>,
}

impl V4l2Hardware {
    /// Scan `/dev` for capture devices
    ///
    /// Back-facing cameras are listed first so index 0 is the back camera
    /// when there is one.
    pub fn discover() -> Self {
        let mut paths: Vec<(u32, String)> = std::fs::read_dir("/dev")
            .into_iter()
            .flatten()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_video_node(path))
            .filter_map(|path| {
                let number = path.file_name()?.to_str()?.strip_prefix("video")?.parse().ok()?;
                Some((number, path.to_string_lossy().to_string()))
            })
            .collect();
        paths.sort();

        let mut cameras: Vec<V4l2Camera> = paths
            .into_iter()
            .filter_map(|(_, path)| probe_camera(&path))
            .collect();
        cameras.sort_by_key(|camera| camera.info.facing != Facing::Back);

        for (index, camera) in cameras.iter().enumerate() {
            info!(
                index,
                path = %camera.path,
                name = %camera.info.name,
                facing = %camera.info.facing,
                orientation = %camera.info.orientation,
                "Found V4L2 camera"
            );
        }

        let flash = FlashHardware::detect();
        if let Some(err) = &flash.permission_error {
            warn!(error = %err, "Torch unavailable");
        }

        Self {
            cameras,
            flash: Arc::new(flash),
            open: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Device node of the camera at `index`
    pub fn device_path(&self, index: usize) -> Option<&str> {
        self.cameras.get(index).map(|c| c.path.as_str())
    }
}

/// Build camera info for `path` if it is a usable capture device
fn probe_camera(path: &str) -> Option<V4l2Camera> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return None;
    }
    if preferred_format(&dev).is_none() {
        debug!(path, "No supported pixel format, skipping");
        return None;
    }

    let facing = match controls::get_control(path, controls::V4L2_CID_CAMERA_ORIENTATION) {
        Some(controls::V4L2_CAMERA_ORIENTATION_BACK) => Facing::Back,
        // Front, external (USB webcams) or unreported
        _ => Facing::Front,
    };
    let orientation = controls::get_control(path, controls::V4L2_CID_CAMERA_SENSOR_ROTATION)
        .map(SensorRotation::from_degrees_int)
        .unwrap_or_default();

    Some(V4l2Camera {
        path: path.to_string(),
        info: CameraInfo {
            name: caps.card,
            facing,
            orientation,
        },
    })
}

/// First of our formats, in preference order, that the device can capture
fn preferred_format(dev: &Device) -> Option<PixelFormat> {
    let offered: Vec<FourCC> = dev
        .enum_formats()
        .ok()?
        .into_iter()
        .map(|desc| desc.fourcc)
        .collect();
    PixelFormat::ALL
        .into_iter()
        .find(|format| offered.contains(&FourCC::new(&format.fourcc())))
}

/// Sizes the device offers for `format`
fn enumerate_sizes(dev: &Device, format: PixelFormat) -> Vec<Size> {
    let fourcc = FourCC::new(&format.fourcc());
    let mut sizes = Vec::new();

    for frame_size in dev.enum_framesizes(fourcc).into_iter().flatten() {
        match frame_size.size {
            FrameSizeEnum::Discrete(discrete) => {
                sizes.push(Size::new(discrete.width, discrete.height));
            }
            FrameSizeEnum::Stepwise(step) => {
                for &(w, h) in STEPWISE_CANDIDATE_SIZES {
                    if (step.min_width..=step.max_width).contains(&w)
                        && (step.min_height..=step.max_height).contains(&h)
                    {
                        sizes.push(Size::new(w, h));
                    }
                }
            }
        }
    }

    sizes.dedup();
    sizes
}

/// Frame-rate ranges the device offers for `format` at `size`
///
/// The first entry spans every rate; the rest are the fixed rates.
fn enumerate_fps_ranges(dev: &Device, format: PixelFormat, size: Size) -> Vec<FpsRange> {
    let fourcc = FourCC::new(&format.fourcc());
    let mut rates: BTreeSet<u32> = BTreeSet::new();

    let intervals = dev
        .enum_frameintervals(fourcc, size.width, size.height)
        .unwrap_or_default();
    for interval in intervals {
        match interval.interval {
            FrameIntervalEnum::Discrete(frac) if frac.numerator > 0 => {
                rates.insert(frac.denominator / frac.numerator);
            }
            FrameIntervalEnum::Stepwise(step) => {
                if step.min.numerator > 0 {
                    rates.insert(step.min.denominator / step.min.numerator);
                }
                if step.max.numerator > 0 {
                    rates.insert(step.max.denominator / step.max.numerator);
                }
            }
            _ => {}
        }
    }
    rates.remove(&0);

    let (Some(&lowest), Some(&highest)) = (rates.first(), rates.last()) else {
        return vec![FpsRange::default()];
    };

    let mut ranges = vec![FpsRange::from_hz(lowest, highest)];
    ranges.extend(
        rates
            .iter()
            .filter(|_| lowest != highest)
            .map(|&hz| FpsRange::from_hz(hz, hz)),
    );
    ranges
}

impl CameraHardware for V4l2Hardware {
    fn backend_type(&self) -> CaptureBackendType {
        CaptureBackendType::V4l2
    }

    fn number_of_cameras(&self) -> usize {
        self.cameras.len()
    }

    fn camera_info(&self, index: usize) -> CaptureResult<CameraInfo> {
        self.cameras
            .get(index)
            .map(|camera| camera.info.clone())
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no camera at index {}", index)))
    }

    fn open(&self, index: usize) -> CaptureResult<Box<dyn CameraHandle>> {
        let camera = self
            .cameras
            .get(index)
            .cloned()
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("no camera at index {}", index))
            })?;

        {
            let mut open = self
                .open
                .lock()
                .map_err(|_| CaptureError::DeviceUnavailable("camera registry poisoned".into()))?;
            if !open.insert(index) {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "{} is busy",
                    camera.path
                )));
            }
        }

        match V4l2Handle::new(
            index,
            camera,
            Arc::clone(&self.flash),
            Arc::clone(&self.open),
        ) {
            Ok(handle) => Ok(Box::new(handle)),
            Err(e) => {
                if let Ok(mut open) = self.open.lock() {
                    open.remove(&index);
                }
                Err(e)
            }
        }
    }
}

struct V4l2Handle {
    index: usize,
    camera: V4l2Camera,
    device: Device,
    params: CameraParameters,
    flash: Arc<FlashHardware>,
    registry: Arc<Mutex<BTreeSet<usize>>>,
    surface: Option<Arc<SurfaceTexture>>,
    handler: Arc<Mutex<Option<RawFrameHandler>>>,
    pool: BufferPool,
    capture: Option<CaptureLoopController>,
    released: bool,
}

impl V4l2Handle {
    fn new(
        index: usize,
        camera: V4l2Camera,
        flash: Arc<FlashHardware>,
        registry: Arc<Mutex<BTreeSet<usize>>>,
    ) -> CaptureResult<Self> {
        let device = Device::with_path(&camera.path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("{}: {}", camera.path, e))
        })?;
        let format = preferred_format(&device).ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("{}: no supported pixel format", camera.path))
        })?;

        let sizes = enumerate_sizes(&device, format);
        let largest = sizes
            .iter()
            .copied()
            .max_by_key(|size| size.pixel_count())
            .unwrap_or(Size::new(640, 480));
        let current = device
            .format()
            .map(|f| Size::new(f.width, f.height))
            .unwrap_or(largest);
        let fps_ranges = enumerate_fps_ranges(&device, format, current);

        let flash_modes = if flash.has_devices() && camera.info.facing == Facing::Back {
            vec![FlashMode::Off, FlashMode::Torch]
        } else {
            Vec::new()
        };
        let focus_modes = if controls::has_control(&camera.path, controls::V4L2_CID_FOCUS_AUTO) {
            vec![FocusMode::Auto, FocusMode::ContinuousPicture]
        } else {
            vec![FocusMode::Fixed]
        };

        let params = CameraParameters {
            preview_size: current,
            supported_preview_sizes: sizes.clone(),
            picture_size: largest,
            supported_picture_sizes: sizes,
            preview_format: format,
            // sizes and rates were enumerated for this format only
            supported_preview_formats: vec![format],
            preview_fps_range: fps_ranges.first().copied().unwrap_or_default(),
            supported_fps_ranges: fps_ranges,
            flash_mode: flash_modes.first().copied(),
            supported_flash_modes: flash_modes,
            focus_mode: focus_modes.first().copied(),
            supported_focus_modes: focus_modes,
            rotation: 0,
        };

        Ok(Self {
            index,
            camera,
            device,
            params,
            flash,
            registry,
            surface: None,
            handler: Arc::new(Mutex::new(None)),
            pool: BufferPool::new(),
            capture: None,
            released: false,
        })
    }

    fn validate(&self, params: &CameraParameters) -> CaptureResult<()> {
        let reject = |what: String| Err(CaptureError::ParameterRejected(what));
        let supported = &self.params.supported_preview_sizes;

        if !supported.is_empty() && !supported.contains(&params.preview_size) {
            return reject(format!("preview size {}", params.preview_size));
        }
        if !self
            .params
            .supported_preview_formats
            .contains(&params.preview_format)
        {
            return reject(format!("preview format {:?}", params.preview_format));
        }
        let fps = params.preview_fps_range;
        if fps.min > fps.max
            || !self
                .params
                .supported_fps_ranges
                .iter()
                .any(|r| r.min <= fps.min && fps.max <= r.max)
        {
            return reject(format!("frame rate {}", fps));
        }
        if let Some(mode) = params.flash_mode
            && !self.params.supported_flash_modes.contains(&mode)
        {
            return reject(format!("flash mode {:?}", mode));
        }
        if let Some(mode) = params.focus_mode
            && !self.params.supported_focus_modes.contains(&mode)
        {
            return reject(format!("focus mode {:?}", mode));
        }
        Ok(())
    }
}

impl CameraHandle for V4l2Handle {
    fn info(&self) -> &CameraInfo {
        &self.camera.info
    }

    fn parameters(&self) -> CaptureResult<CameraParameters> {
        Ok(self.params.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> CaptureResult<()> {
        self.validate(params)?;

        if params.focus_mode != self.params.focus_mode
            && let Some(mode) = params.focus_mode
            && mode != FocusMode::Fixed
        {
            let auto = i32::from(mode != FocusMode::Auto);
            controls::set_control(&self.camera.path, controls::V4L2_CID_FOCUS_AUTO, auto)
                .map_err(CaptureError::ParameterRejected)?;
        }

        if params.flash_mode != self.params.flash_mode {
            let result = match params.flash_mode {
                Some(FlashMode::Torch) => self.flash.all_on(),
                _ => self.flash.all_off(),
            };
            result.map_err(|e| CaptureError::ParameterRejected(format!("torch: {}", e)))?;
        }

        self.params = params.clone();
        Ok(())
    }

    fn set_preview_texture(&mut self, surface: Arc<SurfaceTexture>) -> CaptureResult<()> {
        if surface.is_released() {
            return Err(CaptureError::PreviewBindError("surface released".into()));
        }
        self.surface = Some(surface);
        Ok(())
    }

    fn set_preview_callback_with_buffer(&mut self, handler: Option<RawFrameHandler>) {
        if handler.is_none() {
            self.pool.clear();
        }
        if let Ok(mut slot) = self.handler.lock() {
            *slot = handler;
        }
    }

    fn add_callback_buffer(&mut self, buffer: Vec<u8>) {
        self.pool.add(buffer);
    }

    fn start_preview(&mut self) -> CaptureResult<()> {
        let surface = self
            .surface
            .clone()
            .ok_or_else(|| CaptureError::PreviewBindError("no preview surface".into()))?;

        let size = self.params.preview_size;
        let requested = Format::new(
            size.width,
            size.height,
            FourCC::new(&self.params.preview_format.fourcc()),
        );
        let actual = self
            .device
            .set_format(&requested)
            .map_err(|e| CaptureError::PreviewBindError(format!("set format: {}", e)))?;
        let format = PixelFormat::from_fourcc(&actual.fourcc.repr).ok_or_else(|| {
            CaptureError::PreviewBindError(format!("driver chose {:?}", actual.fourcc))
        })?;
        let size = Size::new(actual.width, actual.height);
        if size != self.params.preview_size {
            warn!(
                requested = %self.params.preview_size,
                actual = %size,
                "Driver adjusted preview size"
            );
        }

        let fps = self.params.preview_fps_range.max_hz().round() as u32;
        if let Err(e) = self.device.set_params(&Parameters::with_fps(fps)) {
            warn!(fps, error = %e, "Failed to set frame rate");
        }

        let path = self.camera.path.clone();
        let handler = Arc::clone(&self.handler);
        let pool = self.pool.clone();
        let mut frames: u64 = 0;
        let mut errors = DequeueErrors::new(timing::V4L2_MAX_CONSECUTIVE_ERRORS);

        self.capture = Some(CaptureLoopController::start_with_init(
            &format!("v4l2-capture-{}", self.index),
            move || {
                let dev = Device::with_path(&path).map_err(|e| format!("open {}: {}", path, e))?;
                let stream: MmapStream<'static> =
                    MmapStream::with_buffers(&dev, Type::VideoCapture, timing::V4L2_BUFFER_COUNT)
                        .map_err(|e| format!("create stream: {}", e))?;
                Ok((dev, stream))
            },
            move |(_dev, stream)| {
                let (buf, meta) = match stream.next() {
                    Ok(frame) => {
                        errors.reset();
                        frame
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            consecutive = errors.count() + 1,
                            "Failed to capture frame"
                        );
                        let action = errors.record_failure();
                        if action == LoopAction::Stop {
                            error!(
                                limit = timing::V4L2_MAX_CONSECUTIVE_ERRORS,
                                "Camera stopped delivering frames, ending capture"
                            );
                        } else {
                            std::thread::sleep(timing::V4L2_RETRY_DELAY);
                        }
                        return action;
                    }
                };

                let used = match meta.bytesused as usize {
                    0 => buf.len(),
                    n => n.min(buf.len()),
                };
                let data = &buf[..used];
                let timestamp_ns = (meta.timestamp.sec as u64)
                    .saturating_mul(1_000_000_000)
                    .saturating_add(meta.timestamp.usec as u64 * 1_000);

                surface.queue_frame(CameraFrame {
                    size,
                    format,
                    data: Arc::from(data),
                    timestamp_ns,
                });

                let handler = handler.lock().ok().and_then(|h| h.clone());
                if let Some(handler) = handler
                    && let Some(mut buffer) = pool.take()
                {
                    buffer.clear();
                    buffer.extend_from_slice(data);
                    handler(RawFrame::new(
                        buffer,
                        pool.clone(),
                        size,
                        format,
                        timestamp_ns,
                    ));
                }

                frames += 1;
                if frames % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(frames, sequence = meta.sequence, "V4L2 capture progress");
                }
                LoopAction::Continue
            },
        ));

        info!(path = %self.camera.path, %size, ?format, fps, "V4L2 preview started");
        Ok(())
    }

    fn stop_preview(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop_preview();
        if self.params.flash_mode == Some(FlashMode::Torch)
            && let Err(e) = self.flash.all_off()
        {
            warn!(error = %e, "Failed to switch torch off");
        }
        self.set_preview_callback_with_buffer(None);
        self.surface = None;
        if let Ok(mut open) = self.registry.lock() {
            open.remove(&self.index);
        }
        self.released = true;
    }
}

impl Drop for V4l2Handle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whether `path` looks like a V4L2 device node
/// Consecutive dequeue failures of one capture stream
///
/// A camera that was unplugged fails every dequeue; the loop backs off
/// between attempts and stops once `limit` failures happen in a row.
struct DequeueErrors {
    consecutive: u32,
    limit: u32,
}

impl DequeueErrors {
    fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    fn count(&self) -> u32 {
        self.consecutive
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }

    fn record_failure(&mut self) -> LoopAction {
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            LoopAction::Stop
        } else {
            LoopAction::Continue
        }
    }
}

pub fn is_video_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("video"))
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_node_names() {
        assert!(is_video_node(Path::new("/dev/video0")));
        assert!(is_video_node(Path::new("/dev/video12")));
        assert!(!is_video_node(Path::new("/dev/video")));
        assert!(!is_video_node(Path::new("/dev/videox")));
        assert!(!is_video_node(Path::new("/dev/media0")));
    }

    #[test]
    fn test_dequeue_errors_stop_after_limit() {
        let mut errors = DequeueErrors::new(3);
        assert_eq!(errors.record_failure(), LoopAction::Continue);
        assert_eq!(errors.record_failure(), LoopAction::Continue);
        // a good frame starts the count over
        errors.reset();
        assert_eq!(errors.count(), 0);
        assert_eq!(errors.record_failure(), LoopAction::Continue);
        assert_eq!(errors.record_failure(), LoopAction::Continue);
        assert_eq!(errors.record_failure(), LoopAction::Stop);
    }

    #[test]
    fn test_discover_does_not_panic() {
        // Works on machines with or without cameras
        let hw = V4l2Hardware::discover();
        for index in 0..hw.number_of_cameras() {
            assert!(hw.camera_info(index).is_ok());
            assert!(hw.device_path(index).is_some());
        }
        assert!(hw.camera_info(hw.number_of_cameras()).is_err());
    }
}
