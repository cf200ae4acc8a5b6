// SPDX-License-Identifier: GPL-3.0-only

//! Preview surfaces and the GPU texture they are bound to
//!
//! A [`SurfaceTexture`] is the hand-off point between the two execution
//! contexts: the camera's delivery thread queues frames into it, and the
//! render loop latches the newest one with [`SurfaceTexture::update_tex_image`]
//! right before drawing.

use crate::backends::camera::types::CameraFrame;
use crate::errors::{CaptureError, CaptureResult};
use bytemuck::{Pod, Zeroable};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier of a GPU texture allocated by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Column-major 4×4 texture-coordinate transform
///
/// `repr(C)` + `Pod` so renderers can upload it directly as uniform bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformMatrix(pub [f32; 16]);

impl TransformMatrix {
    pub const IDENTITY: TransformMatrix = TransformMatrix([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Flips texture coordinates vertically (`t' = 1 - t`)
    pub const FLIP_VERTICAL: TransformMatrix = TransformMatrix([
        1.0, 0.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, 1.0,
    ]);

    /// Raw bytes for GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Apply to a texture coordinate
    pub fn transform_point(&self, s: f32, t: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0] * s + m[4] * t + m[12], m[1] * s + m[5] * t + m[13])
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Listener notified whenever a new frame is queued into a surface
pub type FrameAvailableListener = Box<dyn Fn() + Send + Sync>;

/// Preview surface that a camera writes frames into
pub struct SurfaceTexture {
    texture_id: TextureId,
    pending: Mutex<Option<CameraFrame>>,
    current: Mutex<Option<CameraFrame>>,
    transform: Mutex<TransformMatrix>,
    listener: Mutex<Option<FrameAvailableListener>>,
    released: AtomicBool,
    frames_queued: AtomicU64,
}

impl SurfaceTexture {
    pub fn new(texture_id: TextureId) -> Self {
        Self {
            texture_id,
            pending: Mutex::new(None),
            current: Mutex::new(None),
            transform: Mutex::new(TransformMatrix::IDENTITY),
            listener: Mutex::new(None),
            released: AtomicBool::new(false),
            frames_queued: AtomicU64::new(0),
        }
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture_id
    }

    /// Queue a frame from the camera, replacing any frame not yet latched.
    /// Frames queued after [`SurfaceTexture::release`] are dropped.
    pub fn queue_frame(&self, frame: CameraFrame) {
        if self.is_released() {
            return;
        }
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(frame);
        }
        self.frames_queued.fetch_add(1, Ordering::Relaxed);

        if let Ok(guard) = self.listener.lock()
            && let Some(listener) = guard.as_ref()
        {
            listener();
        }
    }

    /// Latch the most recently queued frame as the texture content
    ///
    /// Fails with [`CaptureError::SurfaceStale`] when the surface has been
    /// released or no frame has ever been queued. A surface that already
    /// holds a frame keeps it when nothing new arrived.
    pub fn update_tex_image(&self) -> CaptureResult<()> {
        if self.is_released() {
            return Err(CaptureError::SurfaceStale("surface released".into()));
        }

        let next = self.pending.lock().ok().and_then(|mut p| p.take());
        let mut current = self
            .current
            .lock()
            .map_err(|_| CaptureError::SurfaceStale("surface lock poisoned".into()))?;

        match next {
            Some(frame) => {
                *current = Some(frame);
                Ok(())
            }
            None if current.is_some() => Ok(()),
            None => Err(CaptureError::SurfaceStale("no frame queued yet".into())),
        }
    }

    /// Frame latched by the last successful [`SurfaceTexture::update_tex_image`]
    pub fn current_frame(&self) -> Option<CameraFrame> {
        self.current.lock().ok()?.clone()
    }

    pub fn transform_matrix(&self) -> TransformMatrix {
        self.transform
            .lock()
            .map(|m| *m)
            .unwrap_or(TransformMatrix::IDENTITY)
    }

    /// Set by the backend to describe how its frames map onto texture space
    pub fn set_transform_matrix(&self, matrix: TransformMatrix) {
        if let Ok(mut transform) = self.transform.lock() {
            *transform = matrix;
        }
    }

    pub fn set_on_frame_available(&self, listener: Option<FrameAvailableListener>) {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = listener;
        }
    }

    /// Total frames queued since creation
    pub fn frames_queued(&self) -> u64 {
        self.frames_queued.load(Ordering::Relaxed)
    }

    /// Detach from the camera; later frames are ignored
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.set_on_frame_available(None);
        if let Ok(mut pending) = self.pending.lock() {
            *pending = None;
        }
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SurfaceTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceTexture")
            .field("texture_id", &self.texture_id)
            .field("released", &self.is_released())
            .field("frames_queued", &self.frames_queued())
            .finish()
    }
}

/// Ownership of the camera texture and the preview surface bound to it
///
/// Constructed only by pipeline setup and torn down by pause, switch or a
/// surface change. There is no path that revives a torn-down texture id.
#[derive(Debug, Default)]
pub enum TextureBinding {
    #[default]
    Absent,
    Bound {
        texture_id: TextureId,
        surface: Arc<SurfaceTexture>,
    },
}

impl TextureBinding {
    /// Bind a freshly allocated texture to a new preview surface
    pub fn bind(texture_id: TextureId) -> Self {
        TextureBinding::Bound {
            texture_id,
            surface: Arc::new(SurfaceTexture::new(texture_id)),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, TextureBinding::Bound { .. })
    }

    pub fn texture_id(&self) -> Option<TextureId> {
        match self {
            TextureBinding::Bound { texture_id, .. } => Some(*texture_id),
            TextureBinding::Absent => None,
        }
    }

    pub fn surface(&self) -> Option<&Arc<SurfaceTexture>> {
        match self {
            TextureBinding::Bound { surface, .. } => Some(surface),
            TextureBinding::Absent => None,
        }
    }

    /// Invalidate the binding, releasing its surface; returns the texture id
    /// that the caller must delete
    pub fn teardown(&mut self) -> Option<TextureId> {
        match std::mem::take(self) {
            TextureBinding::Bound {
                texture_id,
                surface,
            } => {
                surface.release();
                Some(texture_id)
            }
            TextureBinding::Absent => None,
        }
    }
}
