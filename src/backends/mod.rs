// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               CapturePipeline               │
//! └────────────────────┬────────────────────────┘
//!                      │ CameraDevice
//! ┌────────────────────┴────────────────────────┐
//! │  CameraHardware / CameraHandle              │
//! │  ┌─────────────┐    ┌──────────────────┐    │
//! │  │    V4L2     │    │     Virtual      │    │
//! │  │ (+ sysfs    │    │ (test patterns)  │    │
//! │  │   torch)    │    │                  │    │
//! │  └─────────────┘    └──────────────────┘    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
