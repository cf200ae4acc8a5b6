// SPDX-License-Identifier: GPL-3.0-only

//! Debug snapshots of the rendered camera texture

use crate::backends::camera::types::Size;
use crate::constants::snapshot::{DEFAULT_SUBDIR, JPEG_QUALITY};
use crate::errors::{CaptureError, CaptureResult};
use chrono::Local;
use image::RgbaImage;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<YYYYmmdd_HHMMSSmmm>.jpg` for the current local time
pub fn snapshot_file_name() -> String {
    format!("{}.jpg", Local::now().format("%Y%m%d_%H%M%S%3f"))
}

/// Pictures directory (or home) plus the snapshot subdirectory
pub fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_SUBDIR)
}

/// Encode an RGBA buffer as JPEG into `dir`, returning the written path
pub fn save_rgba_jpeg(dir: &Path, size: Size, rgba: Vec<u8>) -> CaptureResult<PathBuf> {
    let rgba_image = RgbaImage::from_raw(size.width, size.height, rgba).ok_or_else(|| {
        CaptureError::Snapshot(format!("buffer does not hold a {} RGBA image", size))
    })?;
    let rgb_image = image::DynamicImage::ImageRgba8(rgba_image).into_rgb8();

    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name());
    let mut writer = BufWriter::new(File::create(&path)?);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    encoder.encode_image(&rgb_image)?;

    info!(path = %path.display(), width = size.width, height = size.height, "Snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_shape() {
        let name = snapshot_file_name();
        assert!(name.ends_with(".jpg"));
        // 8 date digits, underscore, 9 time digits
        assert_eq!(name.len(), 8 + 1 + 9 + 4);
        assert_eq!(&name[8..9], "_");
    }

    #[test]
    fn test_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let size = Size::new(8, 4);
        let path = save_rgba_jpeg(dir.path(), size, vec![200u8; 8 * 4 * 4]).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_rgba_jpeg(dir.path(), Size::new(8, 4), vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, CaptureError::Snapshot(_)));
    }
}
