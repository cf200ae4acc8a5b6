// SPDX-License-Identifier: GPL-3.0-only

//! Camera-to-texture pipeline
//!
//! [`CapturePipeline`] owns the open camera, the texture its preview is bound
//! to, and the renderer that draws it. It is driven from a single render
//! context (see [`render_loop`]) through the surface entry points:
//!
//! ```text
//!   on_surface_created ─▶ on_surface_changed ─▶ on_draw_frame ─▶ on_draw_frame ...
//!                              │
//!                              └─ setup: bind texture, negotiate size, clamp fps,
//!                                        start preview, resolve orientation
//! ```
//!
//! The camera's delivery thread only ever touches the preview surface, the
//! raw preview consumer and the redraw requester.

pub mod callbacks;
pub mod fps;
pub mod orientation;
pub mod render;
pub mod render_loop;
pub mod size;
pub mod snapshot;
pub mod surface;

use crate::backends::camera::types::{Facing, RawFrame, RawFrameHandler, SensorRotation, Size};
use crate::backends::camera::{CameraDevice, CameraHardware};
use crate::config::CaptureConfig;
use crate::constants::timing::{FRAME_LOG_INTERVAL, PREVIEW_CONSUMER_BUDGET};
use crate::errors::{CaptureError, CaptureResult};
use callbacks::{PreviewCallback, PreviewFrame, SurfaceTextureCallback, TextureFrame};
use fps::{Clock, FrameRateMeter, MonotonicClock};
use orientation::{Orientation, resolve_orientation};
use render::{RedrawRequester, RendererFactory, TextureRenderer};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use surface::TextureBinding;
use tracing::{debug, error, info, warn};

/// Result of [`CapturePipeline::switch_camera`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The other camera is now open
    Switched,
    /// Only one camera exists, or a switch was already running
    Skipped,
}

/// Shared slot for the raw preview consumer
type PreviewSlot = Arc<Mutex<Option<Arc<dyn PreviewCallback>>>>;

/// Clears the switching flag when a switch ends, however it ends
struct SwitchGuard(Arc<AtomicBool>);

impl SwitchGuard {
    fn engage(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        SwitchGuard(Arc::clone(flag))
    }
}

impl Drop for SwitchGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The capture-to-texture pipeline
pub struct CapturePipeline {
    config: CaptureConfig,
    device: CameraDevice,
    camera_index: usize,
    binding: TextureBinding,
    renderer: Option<Box<dyn TextureRenderer>>,
    renderer_factory: RendererFactory,
    redraw: Arc<dyn RedrawRequester>,

    target: Size,
    surface_size: Option<Size>,
    /// Capture size in display orientation
    image_size: Size,
    display_rotation: SensorRotation,
    orientation: Orientation,
    raw_rotation: Arc<AtomicU32>,

    paused: bool,
    switching: Arc<AtomicBool>,

    fps: FrameRateMeter,
    frames_rendered: u64,

    surface_texture_callback: Option<Box<dyn SurfaceTextureCallback>>,
    preview_callback: PreviewSlot,
    one_shot_callback: PreviewSlot,
    slow_preview_frames: Arc<AtomicU64>,
    preprocess_buffer: Option<Vec<u8>>,
}

impl CapturePipeline {
    pub fn new(
        config: CaptureConfig,
        hardware: Arc<dyn CameraHardware>,
        renderer_factory: RendererFactory,
        redraw: Arc<dyn RedrawRequester>,
    ) -> Self {
        Self::with_clock(
            config,
            hardware,
            renderer_factory,
            redraw,
            Box::new(MonotonicClock::new()),
        )
    }

    /// Like [`CapturePipeline::new`], measuring render rate with `clock`
    pub fn with_clock(
        config: CaptureConfig,
        hardware: Arc<dyn CameraHardware>,
        renderer_factory: RendererFactory,
        redraw: Arc<dyn RedrawRequester>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let target = config.target_size();
        let camera_index = config.initial_facing.index();
        let display_rotation = config.display_rotation;
        Self {
            config,
            device: CameraDevice::new(hardware),
            camera_index,
            binding: TextureBinding::Absent,
            renderer: None,
            renderer_factory,
            redraw,
            target,
            surface_size: None,
            image_size: target,
            display_rotation,
            orientation: Orientation::default(),
            raw_rotation: Arc::new(AtomicU32::new(0)),
            paused: false,
            switching: Arc::new(AtomicBool::new(false)),
            fps: FrameRateMeter::new(clock),
            frames_rendered: 0,
            surface_texture_callback: None,
            preview_callback: Arc::new(Mutex::new(None)),
            one_shot_callback: Arc::new(Mutex::new(None)),
            slow_preview_frames: Arc::new(AtomicU64::new(0)),
            preprocess_buffer: None,
        }
    }

    // ===== Surface entry points =====

    /// A new render surface exists; restart frame-rate measurement
    pub fn on_surface_created(&mut self) {
        self.fps.reset();
        debug!("Render surface created");
    }

    /// The render surface was (re)sized
    ///
    /// Builds a fresh renderer, runs setup when a camera is open and lays the
    /// quad out for the new size. Failures are logged, never returned.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        let size = Size::new(width, height);
        info!(%size, "Render surface changed");
        self.surface_size = Some(size);

        // The old texture belongs to the old renderer
        self.device.stop_preview();
        self.teardown_binding();

        let mut renderer = (self.renderer_factory)();
        renderer.surface_created();
        renderer.set_viewport(size);
        self.renderer = Some(renderer);

        if self.device.is_open()
            && let Err(e) = self.setup()
        {
            warn!(error = %e, "Pipeline setup failed after surface change");
        }

        if let Some(callback) = self.surface_texture_callback.as_mut() {
            callback.on_surface_created(self.image_size);
        }
        self.relayout();
    }

    /// Draw the latest camera frame; returns whether a draw was issued
    ///
    /// A surface with no new frame still draws, with whatever the texture
    /// last held (nothing before the first frame).
    pub fn on_draw_frame(&mut self) -> bool {
        if self.paused || self.is_switching() || !self.device.is_open() {
            return false;
        }
        let (Some(texture_id), Some(surface)) =
            (self.binding.texture_id(), self.binding.surface().cloned())
        else {
            return false;
        };
        let Some(renderer) = self.renderer.as_mut() else {
            return false;
        };

        if let Err(e) = surface.update_tex_image() {
            debug!(error = %e, "No new frame, drawing previous contents");
        }

        renderer.clear();
        let transform = surface.transform_matrix();
        let draw_texture = match self.surface_texture_callback.as_mut() {
            Some(callback) => callback.process_texture(TextureFrame {
                texture_id,
                size: self.image_size,
                transform,
                output: self.preprocess_buffer.as_deref_mut(),
            }),
            None => texture_id,
        };

        let frame = surface.current_frame();
        if let Err(e) = renderer.draw_frame(draw_texture, &transform, frame.as_ref()) {
            warn!(error = %e, texture = %draw_texture, "Draw failed");
            return false;
        }

        self.fps.record_frame();
        self.frames_rendered += 1;
        if self.frames_rendered % FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames_rendered, "Rendered frames");
        }
        true
    }

    // ===== Lifecycle =====

    /// Open the camera if none is open and schedule a redraw
    ///
    /// With a single camera attached, the back camera index is used. When a
    /// surface already exists, setup runs immediately.
    pub fn on_resume(&mut self) -> CaptureResult<()> {
        self.paused = false;

        if !self.device.is_open() {
            if self.device.number_of_cameras() == 1 {
                self.camera_index = Facing::Back.index();
            }
            self.device.open(self.camera_index)?;

            if self.surface_size.is_some() {
                self.setup()?;
                self.relayout();
            }
        }

        self.redraw.request_render();
        Ok(())
    }

    /// Release the camera, texture and preview surface
    pub fn on_pause(&mut self) {
        self.paused = true;
        self.device.release();
        self.teardown_binding();
        debug!("Pipeline paused");
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ===== Application controls =====

    /// Stored; takes effect at the next setup
    pub fn set_target_resolution(&mut self, width: u32, height: u32) {
        self.target = Size::new(width, height);
        debug!(target = %self.target, "Target resolution set");
    }

    pub fn target_resolution(&self) -> Size {
        self.target
    }

    /// Toggle between the back and front camera
    ///
    /// While paused only the selection changes; the camera opens on resume.
    /// If the other camera cannot be opened, the selection is restored and
    /// no camera is left open.
    pub fn switch_camera(&mut self) -> CaptureResult<SwitchOutcome> {
        if self.is_switching() {
            debug!("Switch already in progress");
            return Ok(SwitchOutcome::Skipped);
        }
        let count = self.device.number_of_cameras();
        if count < 2 {
            debug!(count, "Not enough cameras to switch");
            return Ok(SwitchOutcome::Skipped);
        }

        let previous = self.camera_index;
        let next = Facing::from_index(previous).opposite().index();

        if self.paused {
            self.camera_index = next;
            info!(from = previous, to = next, "Camera selection changed while paused");
            return Ok(SwitchOutcome::Switched);
        }

        let guard = SwitchGuard::engage(&self.switching);
        self.device.release();
        self.teardown_binding();

        self.camera_index = next;
        if let Err(e) = self.device.open(next) {
            warn!(index = next, error = %e, "Switch failed, keeping previous selection");
            self.camera_index = previous;
            return Err(e);
        }
        if self.surface_size.is_some() {
            self.setup()?;
            self.relayout();
        }

        drop(guard);
        info!(from = previous, to = next, "Camera switched");
        self.redraw.request_render();
        Ok(SwitchOutcome::Switched)
    }

    pub fn is_switching(&self) -> bool {
        self.switching.load(Ordering::SeqCst)
    }

    /// Index of the selected camera
    pub fn camera_index(&self) -> usize {
        self.camera_index
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    /// Torch on/off, best effort
    pub fn enable_flash_light(&mut self, enabled: bool) {
        self.device.set_torch(enabled);
    }

    pub fn is_light_available(&self) -> bool {
        self.device.is_torch_available()
    }

    pub fn is_front_camera(&self) -> bool {
        self.device
            .facing()
            .unwrap_or_else(|| Facing::from_index(self.camera_index))
            == Facing::Front
    }

    /// Whether preview content is mirrored
    pub fn is_flip_horizontal(&self) -> bool {
        self.device.needs_mirror()
    }

    /// Sensor mounting angle of the selected camera, in degrees
    ///
    /// The transform actually applied for the current display rotation is
    /// [`CapturePipeline::orientation`].
    pub fn camera_rotation(&self) -> u32 {
        self.device
            .sensor_orientation()
            .or_else(|| {
                self.device
                    .hardware()
                    .camera_info(self.camera_index)
                    .ok()
                    .map(|info| info.orientation)
            })
            .map(|rotation| rotation.degrees())
            .unwrap_or(0)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Capture size in display orientation
    pub fn image_size(&self) -> Size {
        self.image_size
    }

    /// Rendered frames per second since the previous call
    pub fn render_fps(&mut self) -> f64 {
        self.fps.sample()
    }

    /// Frames drawn since the pipeline was created
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Rotate the display; orientation and layout follow immediately
    pub fn set_display_rotation(&mut self, rotation: SensorRotation) {
        if rotation == self.display_rotation {
            return;
        }
        self.display_rotation = rotation;
        info!(%rotation, "Display rotation changed");

        if self.device.is_open() && self.surface_size.is_some() {
            if let Err(e) = self.setup() {
                warn!(error = %e, "Pipeline setup failed after rotation");
            }
            self.relayout();
        } else {
            self.update_orientation();
        }
    }

    pub fn set_surface_texture_callback(
        &mut self,
        callback: Option<Box<dyn SurfaceTextureCallback>>,
    ) {
        self.surface_texture_callback = callback;
    }

    /// Consumer for raw preview frames; effective immediately
    pub fn set_preview_callback(&self, callback: Option<Arc<dyn PreviewCallback>>) {
        if let Ok(mut slot) = self.preview_callback.lock() {
            *slot = callback;
        }
    }

    /// Consumer for the next raw preview frame only
    ///
    /// Cleared once it has run. Needs raw buffer delivery; without it the
    /// callback never fires.
    pub fn set_one_shot_preview_callback(&self, callback: Option<Arc<dyn PreviewCallback>>) {
        if let Ok(mut slot) = self.one_shot_callback.lock() {
            *slot = callback;
        }
    }

    /// Preview consumer calls that overran [`PREVIEW_CONSUMER_BUDGET`]
    pub fn slow_preview_frames(&self) -> u64 {
        self.slow_preview_frames.load(Ordering::SeqCst)
    }

    /// Output buffer handed to the texture callback on every draw
    pub fn set_preprocess_buffer(&mut self, buffer: Option<Vec<u8>>) {
        self.preprocess_buffer = buffer;
    }

    pub fn preprocess_buffer(&self) -> Option<&[u8]> {
        self.preprocess_buffer.as_deref()
    }

    /// Write the last drawn frame to `<dir>/<timestamp>.jpg`
    pub fn save_snapshot(&mut self, dir: &Path) -> CaptureResult<PathBuf> {
        let (size, rgba) = self
            .renderer
            .as_mut()
            .and_then(|renderer| renderer.read_pixels())
            .ok_or_else(|| CaptureError::Snapshot("no frame has been drawn".into()))?;
        snapshot::save_rgba_jpeg(dir, size, rgba)
    }

    // ===== Internals =====

    /// Bind a texture, negotiate the preview and start it
    fn setup(&mut self) -> CaptureResult<()> {
        if !self.device.is_open() {
            return Ok(());
        }

        if !self.binding.is_bound() {
            let renderer = self.renderer.as_mut().ok_or_else(|| {
                CaptureError::PreviewBindError("no renderer for the current surface".into())
            })?;
            self.binding = TextureBinding::bind(renderer.create_texture()?);
        }
        let Some(surface) = self.binding.surface().cloned() else {
            return Err(CaptureError::PreviewBindError(
                "texture binding missing".into(),
            ));
        };

        self.update_orientation();
        self.device.set_rotation(self.orientation.rotation);
        self.device.set_preview_format(self.config.preview_format);

        // Negotiate in sensor space
        let swap = self.orientation.rotation().swaps_dimensions();
        let request = if swap {
            self.target.transposed()
        } else {
            self.target
        };
        let negotiated = self.device.negotiate_and_apply_resolution(request);
        self.image_size = if swap {
            negotiated.transposed()
        } else {
            negotiated
        };

        self.device
            .clamp_preview_frame_rate(self.config.min_preview_fps, self.config.max_preview_fps);

        let raw_sink = if self.config.raw_buffer_delivery {
            surface.set_on_frame_available(None);
            Some(self.raw_frame_handler())
        } else {
            let switching = Arc::clone(&self.switching);
            let redraw = Arc::clone(&self.redraw);
            surface.set_on_frame_available(Some(Box::new(move || {
                if !switching.load(Ordering::SeqCst) {
                    redraw.request_render();
                }
            })));
            None
        };

        self.device.start_preview(surface, raw_sink)?;

        info!(
            target = %self.target,
            negotiated = %negotiated,
            image = %self.image_size,
            orientation = %self.orientation,
            raw = self.config.raw_buffer_delivery,
            "Pipeline setup complete"
        );
        Ok(())
    }

    fn update_orientation(&mut self) {
        let (Some(sensor), Some(facing)) =
            (self.device.sensor_orientation(), self.device.facing())
        else {
            return;
        };
        self.orientation = resolve_orientation(sensor, facing, self.display_rotation);
        self.raw_rotation.store(sensor.degrees(), Ordering::SeqCst);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.adjust_texture_buffer(self.orientation);
        }
    }

    /// Push viewport, orientation and quad size to the renderer
    fn relayout(&mut self) {
        let (Some(renderer), Some(surface)) = (self.renderer.as_mut(), self.surface_size) else {
            return;
        };
        renderer.set_viewport(surface);
        renderer.adjust_texture_buffer(self.orientation);
        renderer.calculate_vertex_buffer(surface, self.image_size);
    }

    fn teardown_binding(&mut self) {
        if let Some(texture) = self.binding.teardown() {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.delete_texture(texture);
            }
            debug!(%texture, "Texture binding torn down");
        }
    }

    /// Raw frame path, run on the camera's delivery thread
    ///
    /// The buffer goes back to the device pool before the handler returns,
    /// whatever the consumer did with it.
    fn raw_frame_handler(&self) -> RawFrameHandler {
        let consumer_slot = Arc::clone(&self.preview_callback);
        let one_shot_slot = Arc::clone(&self.one_shot_callback);
        let switching = Arc::clone(&self.switching);
        let redraw = Arc::clone(&self.redraw);
        let rotation = Arc::clone(&self.raw_rotation);
        let slow_frames = Arc::clone(&self.slow_preview_frames);

        Arc::new(move |frame: RawFrame| {
            let consumer = consumer_slot.lock().ok().and_then(|slot| slot.clone());
            let one_shot = one_shot_slot.lock().ok().and_then(|mut slot| slot.take());
            if consumer.is_some() || one_shot.is_some() {
                let preview = PreviewFrame {
                    data: frame.data(),
                    width: frame.size.width,
                    height: frame.size.height,
                    rotation: rotation.load(Ordering::SeqCst),
                    format_code: frame.format.code(),
                    timestamp_ns: frame.timestamp_ns,
                };
                for sink in one_shot.iter().chain(consumer.iter()) {
                    run_preview_consumer(&**sink, &preview, &slow_frames);
                }
            }
            frame.recycle();

            if !switching.load(Ordering::SeqCst) {
                redraw.request_render();
            }
        })
    }
}

/// Run one consumer on the delivery thread, absorbing errors and panics
fn run_preview_consumer(
    consumer: &dyn PreviewCallback,
    preview: &PreviewFrame<'_>,
    slow_frames: &AtomicU64,
) {
    let started = Instant::now();
    match catch_unwind(AssertUnwindSafe(|| consumer.on_preview_frame(preview))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Preview consumer failed"),
        Err(_) => error!("Preview consumer panicked"),
    }
    let elapsed = started.elapsed();
    if elapsed > PREVIEW_CONSUMER_BUDGET {
        slow_frames.fetch_add(1, Ordering::SeqCst);
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = PREVIEW_CONSUMER_BUDGET.as_millis() as u64,
            "Preview consumer is blocking frame delivery"
        );
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.device.release();
        self.teardown_binding();
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("device", &self.device)
            .field("camera_index", &self.camera_index)
            .field("binding", &self.binding)
            .field("surface_size", &self.surface_size)
            .field("image_size", &self.image_size)
            .field("orientation", &self.orientation)
            .field("paused", &self.paused)
            .field("switching", &self.is_switching())
            .finish()
    }
}
