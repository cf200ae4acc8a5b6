// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic cameras producing test-pattern frames
//!
//! Used for headless runs (`camera-capture preview --virtual`) and as the
//! scriptable hardware in tests: the camera list is configurable, individual
//! operations can be made to fail through [`Faults`], and [`VirtualProbe`]
//! exposes what the pipeline did to the hardware.
//!
//! Frames are produced on a [`CaptureLoopController`] thread at roughly
//! 30 fps, or only when [`VirtualHardware::deliver_frames`] is called if the
//! hardware was built with [`VirtualHardware::manual_delivery`].

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::{
    BufferPool, CameraFrame, CameraInfo, CameraParameters, CaptureBackendType, Facing, FlashMode,
    FocusMode, FpsRange, PixelFormat, RawFrame, RawFrameHandler, SensorRotation, Size,
};
use super::{CameraHandle, CameraHardware};
use crate::constants::timing::VIRTUAL_FRAME_INTERVAL;
use crate::errors::{CaptureError, CaptureResult};
use crate::pipeline::surface::SurfaceTexture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Description of one synthetic camera
#[derive(Debug, Clone)]
pub struct VirtualCameraModel {
    pub info: CameraInfo,
    pub preview_sizes: Vec<Size>,
    pub picture_sizes: Vec<Size>,
    pub fps_ranges: Vec<FpsRange>,
    pub flash_modes: Vec<FlashMode>,
    pub focus_modes: Vec<FocusMode>,
    pub preview_format: PixelFormat,
}

impl VirtualCameraModel {
    pub fn new(name: &str, facing: Facing, orientation: SensorRotation) -> Self {
        Self {
            info: CameraInfo {
                name: name.to_string(),
                facing,
                orientation,
            },
            preview_sizes: [(1280, 720), (960, 540), (640, 480), (320, 240)]
                .into_iter()
                .map(|(w, h)| Size::new(w, h))
                .collect(),
            picture_sizes: vec![Size::new(1920, 1080)],
            fps_ranges: vec![FpsRange::new(1000, 60000)],
            flash_modes: Vec::new(),
            focus_modes: vec![FocusMode::Fixed],
            preview_format: PixelFormat::NV21,
        }
    }

    pub fn with_preview_sizes(mut self, sizes: Vec<Size>) -> Self {
        self.preview_sizes = sizes;
        self
    }

    pub fn with_picture_sizes(mut self, sizes: Vec<Size>) -> Self {
        self.picture_sizes = sizes;
        self
    }

    pub fn with_fps_ranges(mut self, ranges: Vec<FpsRange>) -> Self {
        self.fps_ranges = ranges;
        self
    }

    pub fn with_flash_modes(mut self, modes: Vec<FlashMode>) -> Self {
        self.flash_modes = modes;
        self
    }

    pub fn with_focus_modes(mut self, modes: Vec<FocusMode>) -> Self {
        self.focus_modes = modes;
        self
    }

    pub fn with_preview_format(mut self, format: PixelFormat) -> Self {
        self.preview_format = format;
        self
    }

    fn initial_parameters(&self) -> CameraParameters {
        CameraParameters {
            preview_size: self
                .preview_sizes
                .first()
                .copied()
                .unwrap_or(Size::new(640, 480)),
            supported_preview_sizes: self.preview_sizes.clone(),
            picture_size: self
                .picture_sizes
                .first()
                .copied()
                .unwrap_or(Size::new(640, 480)),
            supported_picture_sizes: self.picture_sizes.clone(),
            preview_format: self.preview_format,
            // test patterns can be rendered in every layout
            supported_preview_formats: PixelFormat::ALL.to_vec(),
            preview_fps_range: self.fps_ranges.first().copied().unwrap_or_default(),
            supported_fps_ranges: self.fps_ranges.clone(),
            flash_mode: self.flash_modes.first().copied(),
            supported_flash_modes: self.flash_modes.clone(),
            focus_mode: self.focus_modes.first().copied(),
            supported_focus_modes: self.focus_modes.clone(),
            rotation: 0,
        }
    }

    /// Check `params` against what this camera supports
    fn validate(&self, params: &CameraParameters) -> CaptureResult<()> {
        let reject = |what: String| Err(CaptureError::ParameterRejected(what));

        if !self.preview_sizes.is_empty() && !self.preview_sizes.contains(&params.preview_size) {
            return reject(format!("preview size {}", params.preview_size));
        }
        if !self.picture_sizes.is_empty() && !self.picture_sizes.contains(&params.picture_size) {
            return reject(format!("picture size {}", params.picture_size));
        }
        let fps = params.preview_fps_range;
        let fps_ok = fps.min <= fps.max
            && (self.fps_ranges.is_empty()
                || self
                    .fps_ranges
                    .iter()
                    .any(|r| r.min <= fps.min && fps.max <= r.max));
        if !fps_ok {
            return reject(format!("frame rate {}", fps));
        }
        if let Some(mode) = params.flash_mode
            && !self.flash_modes.contains(&mode)
        {
            return reject(format!("flash mode {:?}", mode));
        }
        if let Some(mode) = params.focus_mode
            && !self.focus_modes.contains(&mode)
        {
            return reject(format!("focus mode {:?}", mode));
        }
        Ok(())
    }
}

/// Failures to inject into virtual cameras
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// `open` fails with `DeviceUnavailable`
    pub fail_open: bool,
    /// `set_preview_texture` fails with `PreviewBindError`
    pub fail_bind: bool,
    /// Every `set_parameters` call is rejected
    pub reject_parameters: bool,
    /// Changes to the frame-rate range are rejected
    pub reject_fps: bool,
    /// Changes to the flash mode are rejected
    pub reject_flash: bool,
}

/// Where a streaming camera sends its frames
#[derive(Default)]
struct StreamTarget {
    streaming: bool,
    surface: Option<Arc<SurfaceTexture>>,
    handler: Option<RawFrameHandler>,
    pool: BufferPool,
    size: Size,
    format: PixelFormat,
    sequence: u64,
}

/// Observations of what was done to the virtual hardware
#[derive(Default)]
pub struct VirtualProbe {
    open: Mutex<Vec<usize>>,
    history: Mutex<Vec<usize>>,
    targets: Mutex<Vec<Arc<Mutex<StreamTarget>>>>,
    frames_delivered: AtomicU64,
    raw_frames_delivered: AtomicU64,
    raw_frames_dropped: AtomicU64,
}

impl VirtualProbe {
    /// Indices of the cameras currently open, ascending
    pub fn open_indices(&self) -> Vec<usize> {
        let mut open = self.open.lock().map(|o| o.clone()).unwrap_or_default();
        open.sort_unstable();
        open
    }

    /// Every index ever opened, in order
    pub fn open_history(&self) -> Vec<usize> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Raw buffer pool of the most recently opened camera that is still open
    pub fn buffer_pool(&self) -> Option<BufferPool> {
        let targets = self.targets.lock().ok()?;
        let target = targets.last()?.lock().ok()?;
        Some(target.pool.clone())
    }

    /// Preview frames written into surfaces
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    /// Raw frames handed to a preview callback
    pub fn raw_frames_delivered(&self) -> u64 {
        self.raw_frames_delivered.load(Ordering::SeqCst)
    }

    /// Raw frames skipped because no callback buffer was queued
    pub fn raw_frames_dropped(&self) -> u64 {
        self.raw_frames_dropped.load(Ordering::SeqCst)
    }

    fn opened(&self, index: usize, target: Arc<Mutex<StreamTarget>>) {
        if let Ok(mut open) = self.open.lock() {
            open.push(index);
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(index);
        }
        if let Ok(mut targets) = self.targets.lock() {
            targets.push(target);
        }
    }

    fn released(&self, index: usize, target: &Arc<Mutex<StreamTarget>>) {
        if let Ok(mut open) = self.open.lock()
            && let Some(pos) = open.iter().position(|&i| i == index)
        {
            open.remove(pos);
        }
        if let Ok(mut targets) = self.targets.lock() {
            targets.retain(|t| !Arc::ptr_eq(t, target));
        }
    }

    fn is_open(&self, index: usize) -> bool {
        self.open.lock().map(|o| o.contains(&index)).unwrap_or(false)
    }
}

/// A set of synthetic cameras
pub struct VirtualHardware {
    cameras: Vec<VirtualCameraModel>,
    faults: Arc<Mutex<Faults>>,
    probe: Arc<VirtualProbe>,
    frame_interval: Option<Duration>,
    origin: Instant,
}

impl VirtualHardware {
    pub fn new(cameras: Vec<VirtualCameraModel>) -> Self {
        Self {
            cameras,
            faults: Arc::new(Mutex::new(Faults::default())),
            probe: Arc::new(VirtualProbe::default()),
            frame_interval: Some(VIRTUAL_FRAME_INTERVAL),
            origin: Instant::now(),
        }
    }

    /// A typical phone: back camera mounted at 90° with torch, front camera
    /// mounted at 270° without flash
    pub fn phone() -> Self {
        let back = VirtualCameraModel::new(
            "Virtual Back Camera",
            Facing::Back,
            SensorRotation::Rotate90,
        )
        .with_preview_sizes(
            [(1920, 1080), (1280, 720), (960, 540), (640, 480), (320, 240)]
                .into_iter()
                .map(|(w, h)| Size::new(w, h))
                .collect(),
        )
        .with_picture_sizes(vec![
            Size::new(4000, 3000),
            Size::new(4608, 3456),
            Size::new(1920, 1080),
        ])
        .with_flash_modes(vec![
            FlashMode::Off,
            FlashMode::Auto,
            FlashMode::On,
            FlashMode::Torch,
        ])
        .with_focus_modes(vec![FocusMode::Auto, FocusMode::ContinuousPicture]);

        let front = VirtualCameraModel::new(
            "Virtual Front Camera",
            Facing::Front,
            SensorRotation::Rotate270,
        )
        .with_picture_sizes(vec![Size::new(1920, 1080), Size::new(3264, 2448)]);

        Self::new(vec![back, front])
    }

    /// Deliver frames only from [`VirtualHardware::deliver_frames`]
    pub fn manual_delivery(mut self) -> Self {
        self.frame_interval = None;
        self
    }

    pub fn set_faults(&self, faults: Faults) {
        if let Ok(mut current) = self.faults.lock() {
            *current = faults;
        }
    }

    pub fn probe(&self) -> Arc<VirtualProbe> {
        Arc::clone(&self.probe)
    }

    /// Produce `count` frames on every streaming camera, on the calling thread
    ///
    /// Returns the number of frames produced.
    pub fn deliver_frames(&self, count: usize) -> usize {
        let targets: Vec<_> = self
            .probe
            .targets
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();

        let mut produced = 0;
        for _ in 0..count {
            for target in &targets {
                if emit_frame(target, &self.probe, self.origin) {
                    produced += 1;
                }
            }
        }
        produced
    }
}

impl CameraHardware for VirtualHardware {
    fn backend_type(&self) -> CaptureBackendType {
        CaptureBackendType::Virtual
    }

    fn number_of_cameras(&self) -> usize {
        self.cameras.len()
    }

    fn camera_info(&self, index: usize) -> CaptureResult<CameraInfo> {
        self.cameras
            .get(index)
            .map(|model| model.info.clone())
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no virtual camera {}", index)))
    }

    fn open(&self, index: usize) -> CaptureResult<Box<dyn CameraHandle>> {
        let model = self
            .cameras
            .get(index)
            .cloned()
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("no virtual camera {}", index))
            })?;

        let faults = self.faults.lock().map(|f| *f).unwrap_or_default();
        if faults.fail_open {
            return Err(CaptureError::DeviceUnavailable(format!(
                "virtual camera {} failed to open",
                index
            )));
        }
        if self.probe.is_open(index) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "virtual camera {} is busy",
                index
            )));
        }

        let target = Arc::new(Mutex::new(StreamTarget::default()));
        self.probe.opened(index, Arc::clone(&target));
        debug!(index, name = %model.info.name, "Virtual camera opened");

        Ok(Box::new(VirtualHandle {
            index,
            params: model.initial_parameters(),
            model,
            faults: Arc::clone(&self.faults),
            probe: Arc::clone(&self.probe),
            target,
            surface: None,
            frame_loop: None,
            frame_interval: self.frame_interval,
            origin: self.origin,
            released: false,
        }))
    }
}

struct VirtualHandle {
    index: usize,
    model: VirtualCameraModel,
    params: CameraParameters,
    faults: Arc<Mutex<Faults>>,
    probe: Arc<VirtualProbe>,
    target: Arc<Mutex<StreamTarget>>,
    surface: Option<Arc<SurfaceTexture>>,
    frame_loop: Option<CaptureLoopController>,
    frame_interval: Option<Duration>,
    origin: Instant,
    released: bool,
}

impl VirtualHandle {
    fn faults(&self) -> Faults {
        self.faults.lock().map(|f| *f).unwrap_or_default()
    }

    fn with_target(&self, f: impl FnOnce(&mut StreamTarget)) {
        if let Ok(mut target) = self.target.lock() {
            f(&mut target);
        }
    }
}

impl CameraHandle for VirtualHandle {
    fn info(&self) -> &CameraInfo {
        &self.model.info
    }

    fn parameters(&self) -> CaptureResult<CameraParameters> {
        Ok(self.params.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> CaptureResult<()> {
        let faults = self.faults();
        if faults.reject_parameters {
            return Err(CaptureError::ParameterRejected("parameters locked".into()));
        }
        if faults.reject_fps && params.preview_fps_range != self.params.preview_fps_range {
            return Err(CaptureError::ParameterRejected(format!(
                "frame rate {}",
                params.preview_fps_range
            )));
        }
        if faults.reject_flash && params.flash_mode != self.params.flash_mode {
            return Err(CaptureError::ParameterRejected("flash mode".into()));
        }
        self.model.validate(params)?;

        self.params = params.clone();
        Ok(())
    }

    fn set_preview_texture(&mut self, surface: Arc<SurfaceTexture>) -> CaptureResult<()> {
        if self.faults().fail_bind {
            return Err(CaptureError::PreviewBindError(
                "virtual surface bind failure".into(),
            ));
        }
        if surface.is_released() {
            return Err(CaptureError::PreviewBindError("surface released".into()));
        }
        self.surface = Some(surface);
        Ok(())
    }

    fn set_preview_callback_with_buffer(&mut self, handler: Option<RawFrameHandler>) {
        self.with_target(|target| {
            if handler.is_none() {
                target.pool.clear();
            }
            target.handler = handler;
        });
    }

    fn add_callback_buffer(&mut self, buffer: Vec<u8>) {
        self.with_target(|target| target.pool.add(buffer));
    }

    fn start_preview(&mut self) -> CaptureResult<()> {
        let surface = self
            .surface
            .clone()
            .ok_or_else(|| CaptureError::PreviewBindError("no preview surface".into()))?;

        let (size, format) = (self.params.preview_size, self.params.preview_format);
        self.with_target(|target| {
            target.streaming = true;
            target.surface = Some(surface);
            target.size = size;
            target.format = format;
        });

        if let Some(interval) = self.frame_interval {
            let target = Arc::clone(&self.target);
            let probe = Arc::clone(&self.probe);
            let origin = self.origin;
            self.frame_loop = Some(CaptureLoopController::start(
                &format!("virtual-camera-{}", self.index),
                move || {
                    emit_frame(&target, &probe, origin);
                    std::thread::sleep(interval);
                    LoopAction::Continue
                },
            ));
        }

        info!(index = self.index, %size, ?format, "Virtual preview started");
        Ok(())
    }

    fn stop_preview(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
        }
        self.with_target(|target| {
            target.streaming = false;
            target.surface = None;
        });
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop_preview();
        self.with_target(|target| {
            target.handler = None;
            target.pool.clear();
        });
        self.surface = None;
        self.probe.released(self.index, &self.target);
        self.released = true;
        debug!(index = self.index, "Virtual camera released");
    }
}

impl Drop for VirtualHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Write one synthetic frame into the target's surface and raw callback
///
/// The target lock is not held while the surface listener or the raw
/// callback run.
fn emit_frame(target: &Mutex<StreamTarget>, probe: &VirtualProbe, origin: Instant) -> bool {
    let (surface, handler, pool, size, format, sequence) = {
        let Ok(mut target) = target.lock() else {
            return false;
        };
        if !target.streaming {
            return false;
        }
        target.sequence += 1;
        (
            target.surface.clone(),
            target.handler.clone(),
            target.pool.clone(),
            target.size,
            target.format,
            target.sequence,
        )
    };

    let timestamp_ns = origin.elapsed().as_nanos() as u64;
    let pixels: Arc<[u8]> = Arc::from(test_pattern(format, size, sequence));

    // Surface first, so a redraw requested by the raw path sees this frame
    if let Some(surface) = surface {
        surface.queue_frame(CameraFrame {
            size,
            format,
            data: Arc::clone(&pixels),
            timestamp_ns,
        });
        probe.frames_delivered.fetch_add(1, Ordering::SeqCst);
    }

    if let Some(handler) = handler {
        match pool.take() {
            Some(mut buffer) => {
                buffer.clear();
                buffer.extend_from_slice(&pixels);
                probe.raw_frames_delivered.fetch_add(1, Ordering::SeqCst);
                handler(RawFrame::new(buffer, pool, size, format, timestamp_ns));
            }
            None => {
                trace!(sequence, "No callback buffer queued, raw frame dropped");
                probe.raw_frames_dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
    true
}

/// Diagonal luma gradient that scrolls with `sequence`, neutral chroma
pub fn test_pattern(format: PixelFormat, size: Size, sequence: u64) -> Vec<u8> {
    let w = size.width as usize;
    let h = size.height as usize;
    let shift = (sequence * 4) as usize;
    let luma = |x: usize, y: usize| ((x + y + shift) % 256) as u8;

    let mut data = vec![128u8; format.frame_size(size)];
    match format {
        PixelFormat::NV21 | PixelFormat::YV12 | PixelFormat::NV16 => {
            for y in 0..h {
                for x in 0..w {
                    data[y * w + x] = luma(x, y);
                }
            }
        }
        PixelFormat::YUY2 => {
            for y in 0..h {
                for x in 0..w {
                    data[(y * w + x) * 2] = luma(x, y);
                }
            }
        }
        PixelFormat::RGB565 => {
            for y in 0..h {
                for x in 0..w {
                    let v = luma(x, y) as u16;
                    let px = ((v >> 3) << 11) | ((v >> 2) << 5) | (v >> 3);
                    let i = (y * w + x) * 2;
                    data[i..i + 2].copy_from_slice(&px.to_le_bytes());
                }
            }
        }
    }
    data
}
