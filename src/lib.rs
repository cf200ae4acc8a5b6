// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture-to-texture pipeline
//!
//! Opens a camera, negotiates a preview size and frame rate, streams frames
//! into a texture-backed preview surface and draws them on a render loop,
//! with an optional raw-buffer path for encoders and analysers.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera hardware abstraction (V4L2 and virtual cameras)
//! - [`pipeline`]: Size negotiation, orientation, rendering and the render loop
//! - [`config`]: User configuration handling
//! - [`flash`]: Torch LEDs via sysfs
//!
//! # Example
//!
//! ```ignore
//! let render_loop = RenderLoop::spawn(move |redraw| {
//!     CapturePipeline::new(config, hardware, renderer_factory, redraw)
//! });
//! let handle = render_loop.handle();
//! handle.surface_created()?;
//! handle.surface_changed(720, 1280)?;
//! handle.resume()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod pipeline;

// Re-export commonly used types
pub use backends::camera::{CameraDevice, CameraHardware, DeviceState};
pub use config::CaptureConfig;
pub use errors::{CaptureError, CaptureResult};
pub use pipeline::render_loop::{PipelineHandle, RenderLoop};
pub use pipeline::{CapturePipeline, SwitchOutcome};
