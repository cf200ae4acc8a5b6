// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for preview frames
//!
//! Renderers without YUV sampling support, the debug snapshot path, and the
//! headless renderer all go through [`frame_to_rgba`].

use super::types::{CameraFrame, PixelFormat, Size};

/// BT.601 YUV to RGB for a single sample
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

#[inline]
fn push_rgba(rgba: &mut Vec<u8>, rgb: [u8; 3]) {
    rgba.extend_from_slice(&rgb);
    rgba.push(255);
}

/// Convert YUYV (YUV 4:2:2) to RGBA
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            if rgba.len() >= pixel_count * 4 {
                break;
            }
            push_rgba(&mut rgba, yuv_to_rgb(y, u, v));
        }
    }

    rgba
}

/// Convert a semi-planar YUV image (Y plane followed by interleaved chroma)
///
/// `v_first` selects VU ordering (NV21) over UV. `vertical_subsampling` is 2
/// for 4:2:0 layouts and 1 for 4:2:2.
fn semi_planar_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    v_first: bool,
    vertical_subsampling: usize,
) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut rgba = Vec::with_capacity(w * h * 4);
    if data.len() < w * h {
        return rgba;
    }

    let (luma, chroma) = data.split_at(w * h);
    // Chroma rows are a full width of interleaved pairs
    let chroma_stride = w.div_ceil(2) * 2;

    for row in 0..h {
        for col in 0..w {
            let y = luma[row * w + col];
            let idx = (row / vertical_subsampling) * chroma_stride + (col / 2) * 2;
            let (a, b) = match (chroma.get(idx), chroma.get(idx + 1)) {
                (Some(&a), Some(&b)) => (a, b),
                _ => (128, 128),
            };
            let (u, v) = if v_first { (b, a) } else { (a, b) };
            push_rgba(&mut rgba, yuv_to_rgb(y, u, v));
        }
    }

    rgba
}

/// Convert NV21 (Y plane + interleaved VU at quarter resolution) to RGBA
pub fn nv21_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    semi_planar_to_rgba(data, width, height, true, 2)
}

/// Convert NV16 (Y plane + interleaved UV at half horizontal resolution) to RGBA
pub fn nv16_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    semi_planar_to_rgba(data, width, height, false, 1)
}

/// Convert YV12 (Y plane, then V plane, then U plane, 4:2:0) to RGBA
pub fn yv12_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let mut rgba = Vec::with_capacity(w * h * 4);
    if data.len() < w * h + 2 * cw * ch {
        return rgba;
    }

    let (luma, rest) = data.split_at(w * h);
    let (v_plane, u_plane) = rest.split_at(cw * ch);

    for row in 0..h {
        for col in 0..w {
            let c = (row / 2) * cw + col / 2;
            push_rgba(
                &mut rgba,
                yuv_to_rgb(luma[row * w + col], u_plane[c], v_plane[c]),
            );
        }
    }

    rgba
}

/// Convert little-endian RGB565 to RGBA
pub fn rgb565_to_rgba(data: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(data.len() * 2);
    for chunk in data.chunks_exact(2) {
        let px = u16::from_le_bytes([chunk[0], chunk[1]]);
        let r = ((px >> 11) & 0x1F) as u8;
        let g = ((px >> 5) & 0x3F) as u8;
        let b = (px & 0x1F) as u8;
        rgba.extend_from_slice(&[
            (r << 3) | (r >> 2),
            (g << 2) | (g >> 4),
            (b << 3) | (b >> 2),
            255,
        ]);
    }
    rgba
}

/// Convert raw pixels of any supported preview format to RGBA
pub fn to_rgba(format: PixelFormat, data: &[u8], size: Size) -> Vec<u8> {
    match format {
        PixelFormat::NV21 => nv21_to_rgba(data, size.width, size.height),
        PixelFormat::NV16 => nv16_to_rgba(data, size.width, size.height),
        PixelFormat::YV12 => yv12_to_rgba(data, size.width, size.height),
        PixelFormat::YUY2 => yuyv_to_rgba(data, size.width, size.height),
        PixelFormat::RGB565 => rgb565_to_rgba(data),
    }
}

/// Convert a preview frame to RGBA
pub fn frame_to_rgba(frame: &CameraFrame) -> Vec<u8> {
    to_rgba(frame.format, &frame.data, frame.size)
}
