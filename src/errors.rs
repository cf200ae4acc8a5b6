// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture pipeline
//!
//! Only [`CaptureError::DeviceUnavailable`] and [`CaptureError::PreviewBindError`]
//! are ever surfaced to callers of open/switch operations. The remaining
//! variants are absorbed (logged and ignored) by the pipeline, so the worst
//! outcome of any failure is a skipped or black frame.

use std::fmt;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Main capture error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Opening the device failed (busy, absent, permission denied)
    DeviceUnavailable(String),
    /// The platform refused to bind the preview surface to the device
    PreviewBindError(String),
    /// The device reported an empty list of supported sizes
    NoSupportedSizes,
    /// The platform declined a requested parameter (frame rate, flash mode, ...)
    ParameterRejected(String),
    /// The preview surface has no frame to latch yet, or was released
    SurfaceStale(String),
    /// The render loop thread is gone
    RenderLoopClosed,
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
    /// Debug snapshot encoding failed
    Snapshot(String),
}

impl CaptureError {
    /// Whether the pipeline absorbs this error instead of returning it
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            CaptureError::NoSupportedSizes
                | CaptureError::ParameterRejected(_)
                | CaptureError::SurfaceStale(_)
        )
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            CaptureError::PreviewBindError(msg) => write!(f, "Preview bind failed: {}", msg),
            CaptureError::NoSupportedSizes => write!(f, "Camera reports no supported sizes"),
            CaptureError::ParameterRejected(msg) => write!(f, "Parameter rejected: {}", msg),
            CaptureError::SurfaceStale(msg) => write!(f, "Preview surface not ready: {}", msg),
            CaptureError::RenderLoopClosed => write!(f, "Render loop is not running"),
            CaptureError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CaptureError::Io(msg) => write!(f, "I/O error: {}", msg),
            CaptureError::Snapshot(msg) => write!(f, "Snapshot failed: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Snapshot(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorbed_errors() {
        assert!(CaptureError::NoSupportedSizes.is_absorbed());
        assert!(CaptureError::ParameterRejected("fps".into()).is_absorbed());
        assert!(CaptureError::SurfaceStale("no frame".into()).is_absorbed());
        assert!(
            !CaptureError::DeviceUnavailable("busy".into()).is_absorbed()
        );
        assert!(
            !CaptureError::PreviewBindError("bad surface".into()).is_absorbed()
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: CaptureError = std::io::Error::other("disk full").into();
        assert_eq!(err, CaptureError::Io("disk full".to_string()));
    }
}
