// SPDX-License-Identifier: GPL-3.0-only

//! Renderer seam between the pipeline and whatever draws the camera texture
//!
//! The pipeline never talks to a GPU API directly. It drives a
//! [`TextureRenderer`] created fresh for every surface, and asks the host to
//! schedule a draw through a [`RedrawRequester`].

use crate::backends::camera::format_converters;
use crate::backends::camera::types::{CameraFrame, Size};
use crate::errors::{CaptureError, CaptureResult};
use crate::pipeline::orientation::Orientation;
use crate::pipeline::surface::{TextureId, TransformMatrix};
use bytemuck::{Pod, Zeroable};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Draws the camera texture onto the current surface
///
/// All methods run on the render loop.
pub trait TextureRenderer {
    /// The surface behind this renderer has just been created
    fn surface_created(&mut self) {}

    /// Allocate the texture the camera preview is bound to
    fn create_texture(&mut self) -> CaptureResult<TextureId>;

    fn delete_texture(&mut self, texture: TextureId);

    fn set_viewport(&mut self, size: Size);

    fn clear(&mut self);

    /// Update rotation and mirroring applied to texture coordinates
    fn adjust_texture_buffer(&mut self, orientation: Orientation);

    /// Recompute the quad so an `image`-sized frame covers `surface`
    fn calculate_vertex_buffer(&mut self, surface: Size, image: Size);

    /// Draw `texture` with the surface transform; `frame` is the latched
    /// content when the renderer needs CPU access to it
    fn draw_frame(
        &mut self,
        texture: TextureId,
        transform: &TransformMatrix,
        frame: Option<&CameraFrame>,
    ) -> CaptureResult<()>;

    /// RGBA contents of the last drawn frame, for debug snapshots
    fn read_pixels(&mut self) -> Option<(Size, Vec<u8>)> {
        None
    }
}

/// Builds a renderer for each new surface
pub type RendererFactory = Box<dyn FnMut() -> Box<dyn TextureRenderer> + Send>;

/// Asks the render loop to draw another frame
///
/// Called from the camera's delivery thread; must not block.
pub trait RedrawRequester: Send + Sync {
    fn request_render(&self);
}

impl<F> RedrawRequester for F
where
    F: Fn() + Send + Sync,
{
    fn request_render(&self) {
        self()
    }
}

/// Per-draw shader parameters
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadUniform {
    /// Horizontal and vertical scale of the full-screen quad
    pub scale: [f32; 2],
    /// Clockwise quarter turns applied to texture coordinates
    pub quarter_turns: u32,
    /// Mirror horizontally: 0 = normal, 1 = mirrored
    pub mirror: u32,
}

impl Default for QuadUniform {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            quarter_turns: 0,
            mirror: 0,
        }
    }
}

/// Quad scale that makes an `image` cover `surface` without distortion
///
/// The overflowing axis is scaled up, so the image is center-cropped.
pub fn cover_scale(surface: Size, image: Size) -> [f32; 2] {
    if surface.is_empty() || image.is_empty() {
        return [1.0, 1.0];
    }
    let surface_aspect = surface.width as f32 / surface.height as f32;
    let image_aspect = image.width as f32 / image.height as f32;
    if image_aspect > surface_aspect {
        [image_aspect / surface_aspect, 1.0]
    } else {
        [1.0, surface_aspect / image_aspect]
    }
}

/// Triangle-strip positions of the quad for [`cover_scale`]
pub fn quad_vertices(surface: Size, image: Size) -> [f32; 8] {
    let [sx, sy] = cover_scale(surface, image);
    [-sx, -sy, sx, -sy, -sx, sy, sx, sy]
}

/// What a [`HeadlessRenderer`] has been asked to do, shared across the
/// renderers one factory produces
#[derive(Debug, Default)]
pub struct RenderStats {
    surfaces: AtomicU64,
    draws: AtomicU64,
    clears: AtomicU64,
    textures_created: AtomicU64,
    textures_deleted: AtomicU64,
    live_textures: Mutex<BTreeSet<u32>>,
    last_drawn: Mutex<Option<TextureId>>,
    viewport: Mutex<Option<Size>>,
    uniform: Mutex<QuadUniform>,
}

impl RenderStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Renderers created for surfaces
    pub fn surfaces(&self) -> u64 {
        self.surfaces.load(Ordering::SeqCst)
    }

    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn textures_created(&self) -> u64 {
        self.textures_created.load(Ordering::SeqCst)
    }

    pub fn textures_deleted(&self) -> u64 {
        self.textures_deleted.load(Ordering::SeqCst)
    }

    /// Textures created and not yet deleted
    pub fn live_textures(&self) -> usize {
        self.live_textures.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn last_drawn(&self) -> Option<TextureId> {
        self.last_drawn.lock().ok().and_then(|t| *t)
    }

    pub fn viewport(&self) -> Option<Size> {
        self.viewport.lock().ok().and_then(|v| *v)
    }

    pub fn uniform(&self) -> QuadUniform {
        self.uniform.lock().map(|u| *u).unwrap_or_default()
    }

    fn update_uniform(&self, edit: impl FnOnce(&mut QuadUniform)) {
        if let Ok(mut uniform) = self.uniform.lock() {
            edit(&mut uniform);
        }
    }
}

/// CPU-only renderer for headless runs and tests
///
/// Keeps the last drawn frame so it can be read back as RGBA.
pub struct HeadlessRenderer {
    stats: Arc<RenderStats>,
    next_texture: Arc<AtomicU32>,
    uniform: QuadUniform,
    last_frame: Option<CameraFrame>,
}

impl HeadlessRenderer {
    pub fn new(stats: Arc<RenderStats>) -> Self {
        Self::with_counter(stats, Arc::new(AtomicU32::new(1)))
    }

    fn with_counter(stats: Arc<RenderStats>, next_texture: Arc<AtomicU32>) -> Self {
        Self {
            stats,
            next_texture,
            uniform: QuadUniform::default(),
            last_frame: None,
        }
    }

    /// Factory producing renderers that report into `stats` and never reuse
    /// a texture id
    pub fn factory(stats: Arc<RenderStats>) -> RendererFactory {
        let next_texture = Arc::new(AtomicU32::new(1));
        Box::new(move || {
            Box::new(HeadlessRenderer::with_counter(
                Arc::clone(&stats),
                Arc::clone(&next_texture),
            )) as Box<dyn TextureRenderer>
        })
    }

    pub fn uniform(&self) -> QuadUniform {
        self.uniform
    }
}

impl TextureRenderer for HeadlessRenderer {
    fn surface_created(&mut self) {
        self.stats.surfaces.fetch_add(1, Ordering::SeqCst);
    }

    fn create_texture(&mut self) -> CaptureResult<TextureId> {
        let id = TextureId(self.next_texture.fetch_add(1, Ordering::SeqCst));
        self.stats
            .live_textures
            .lock()
            .map_err(|_| CaptureError::PreviewBindError("texture table poisoned".into()))?
            .insert(id.0);
        self.stats.textures_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Ok(mut live) = self.stats.live_textures.lock()
            && live.remove(&texture.0)
        {
            self.stats.textures_deleted.fetch_add(1, Ordering::SeqCst);
        }
        self.last_frame = None;
    }

    fn set_viewport(&mut self, size: Size) {
        if let Ok(mut viewport) = self.stats.viewport.lock() {
            *viewport = Some(size);
        }
    }

    fn clear(&mut self) {
        self.stats.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn adjust_texture_buffer(&mut self, orientation: Orientation) {
        self.uniform.quarter_turns = orientation.rotation().quarter_turns();
        self.uniform.mirror = orientation.mirror as u32;
        let uniform = self.uniform;
        self.stats.update_uniform(|u| {
            u.quarter_turns = uniform.quarter_turns;
            u.mirror = uniform.mirror;
        });
    }

    fn calculate_vertex_buffer(&mut self, surface: Size, image: Size) {
        self.uniform.scale = cover_scale(surface, image);
        let scale = self.uniform.scale;
        self.stats.update_uniform(|u| u.scale = scale);
    }

    fn draw_frame(
        &mut self,
        texture: TextureId,
        _transform: &TransformMatrix,
        frame: Option<&CameraFrame>,
    ) -> CaptureResult<()> {
        if let Some(frame) = frame {
            self.last_frame = Some(frame.clone());
        }
        if let Ok(mut last) = self.stats.last_drawn.lock() {
            *last = Some(texture);
        }
        self.stats.draws.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_pixels(&mut self) -> Option<(Size, Vec<u8>)> {
        let frame = self.last_frame.as_ref()?;
        let rgba = format_converters::frame_to_rgba(frame);
        (!rgba.is_empty()).then_some((frame.size, rgba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;

    #[test]
    fn test_cover_scale_crops_wider_image() {
        // 16:9 image on a 1:1 surface overflows horizontally
        let [sx, sy] = cover_scale(Size::new(100, 100), Size::new(160, 90));
        assert!((sx - 160.0 / 90.0).abs() < 1e-5);
        assert_eq!(sy, 1.0);

        assert_eq!(cover_scale(Size::new(0, 100), Size::new(4, 3)), [1.0, 1.0]);
    }

    #[test]
    fn test_quad_vertices_match_scale() {
        let v = quad_vertices(Size::new(720, 1280), Size::new(720, 1280));
        assert_eq!(v, [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_texture_ids_unique_across_renderers() {
        let stats = RenderStats::new();
        let mut factory = HeadlessRenderer::factory(Arc::clone(&stats));
        let a = factory().create_texture().unwrap();
        let b = factory().create_texture().unwrap();
        assert_ne!(a, b);
        assert_eq!(stats.live_textures(), 2);
    }

    #[test]
    fn test_read_pixels_after_draw() {
        let stats = RenderStats::new();
        let mut renderer = HeadlessRenderer::new(Arc::clone(&stats));
        assert!(renderer.read_pixels().is_none());

        let size = Size::new(4, 2);
        let frame = CameraFrame {
            size,
            format: PixelFormat::NV21,
            data: Arc::from(vec![128u8; PixelFormat::NV21.frame_size(size)]),
            timestamp_ns: 0,
        };
        let texture = renderer.create_texture().unwrap();
        renderer
            .draw_frame(texture, &TransformMatrix::IDENTITY, Some(&frame))
            .unwrap();

        let (read_size, rgba) = renderer.read_pixels().unwrap();
        assert_eq!(read_size, size);
        assert_eq!(rgba.len(), 4 * 2 * 4);
        assert_eq!(stats.draws(), 1);
        assert_eq!(stats.last_drawn(), Some(texture));
    }

    #[test]
    fn test_orientation_reaches_uniform() {
        let stats = RenderStats::new();
        let mut renderer = HeadlessRenderer::new(Arc::clone(&stats));
        renderer.adjust_texture_buffer(Orientation {
            rotation: 270,
            mirror: true,
        });
        assert_eq!(stats.uniform().quarter_turns, 3);
        assert_eq!(stats.uniform().mirror, 1);
        assert_eq!(bytemuck::bytes_of(&renderer.uniform()).len(), 16);
    }
}
