// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration, stored as JSON under the user's config directory

use crate::backends::camera::types::{
    CaptureBackendType, Facing, PixelFormat, SensorRotation, Size,
};
use crate::constants::{frame_rate, target};
use crate::errors::{CaptureError, CaptureResult};
use crate::pipeline::snapshot::default_snapshot_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name under the platform config directory
const CONFIG_DIR_NAME: &str = "camera-capture";
const CONFIG_FILE_NAME: &str = "config.json";

/// Everything the pipeline reads at startup
///
/// Missing fields in a stored file take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera backend to open devices with
    pub backend: CaptureBackendType,
    /// Requested preview width, in display orientation
    pub target_width: u32,
    /// Requested preview height, in display orientation
    pub target_height: u32,
    /// Lower bound of the preview frame rate, in Hz
    pub min_preview_fps: u32,
    /// Upper bound of the preview frame rate, in Hz
    pub max_preview_fps: u32,
    /// Deliver raw preview buffers to the preview consumer
    pub raw_buffer_delivery: bool,
    /// Raw preview layout to request, when the camera offers it
    pub preview_format: PixelFormat,
    /// Camera opened first
    pub initial_facing: Facing,
    /// Rotation of the display from its natural orientation
    pub display_rotation: SensorRotation,
    /// Where debug snapshots go; the pictures directory when unset
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackendType::default(),
            target_width: target::DEFAULT_WIDTH,
            target_height: target::DEFAULT_HEIGHT,
            min_preview_fps: frame_rate::MIN_PREVIEW_FPS,
            max_preview_fps: frame_rate::MAX_PREVIEW_FPS,
            raw_buffer_delivery: true,
            preview_format: PixelFormat::NV21,
            initial_facing: Facing::Front,
            display_rotation: SensorRotation::None,
            snapshot_dir: None,
        }
    }
}

impl CaptureConfig {
    pub fn target_size(&self) -> Size {
        Size::new(self.target_width, self.target_height)
    }

    /// `<config dir>/camera-capture/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Snapshot directory, falling back to the pictures directory
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(default_snapshot_dir)
    }

    pub fn load(path: &Path) -> CaptureResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: CaptureConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Stored configuration, or defaults when it is missing or unreadable
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring configuration file");
                Self::default()
            }
        }
    }

    fn validate(&self) -> CaptureResult<()> {
        if self.target_size().is_empty() {
            return Err(CaptureError::Config(format!(
                "target resolution {} is empty",
                self.target_size()
            )));
        }
        if self.min_preview_fps > self.max_preview_fps {
            return Err(CaptureError::Config(format!(
                "frame rate bounds {}..{} are inverted",
                self.min_preview_fps, self.max_preview_fps
            )));
        }
        Ok(())
    }
}
