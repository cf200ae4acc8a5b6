// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 control queries
//!
//! Only the handful of controls the capture pipeline needs: where the camera
//! faces, how its sensor is mounted, and continuous autofocus.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

/// Auto focus enable
pub const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;
/// Camera orientation (menu: front / back / external)
pub const V4L2_CID_CAMERA_ORIENTATION: u32 = V4L2_CID_CAMERA_CLASS_BASE + 34;
/// Sensor mounting rotation in degrees
pub const V4L2_CID_CAMERA_SENSOR_ROTATION: u32 = V4L2_CID_CAMERA_CLASS_BASE + 35;

/// Menu values of `V4L2_CID_CAMERA_ORIENTATION`
pub const V4L2_CAMERA_ORIENTATION_FRONT: i32 = 0;
pub const V4L2_CAMERA_ORIENTATION_BACK: i32 = 1;
pub const V4L2_CAMERA_ORIENTATION_EXTERNAL: i32 = 2;

const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr
/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Information about a V4L2 control
#[derive(Debug, Clone)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }
}

fn extract_name(bytes: &[u8; 32]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(32);
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_QUERYCTRL as _,
            &mut qctrl as *mut V4l2Queryctrl,
        )
    };
    if result < 0 {
        return None;
    }

    Some(ControlInfo {
        id: qctrl.id,
        name: extract_name(&qctrl.name),
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        default_value: qctrl.default_value,
        flags: qctrl.flags,
    })
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_G_CTRL as _,
            &mut ctrl as *mut V4l2Control,
        )
    };
    if result < 0 {
        debug!(device_path, control_id, "V4L2 control not readable");
        return None;
    }

    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), String> {
    let file = File::open(device_path).map_err(|e| format!("Failed to open device: {}", e))?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_S_CTRL as _,
            &mut ctrl as *mut V4l2Control,
        )
    };
    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(device_path, control_id, value, ?errno, "Failed to set V4L2 control");
        return Err(format!("Failed to set control: {}", errno));
    }

    Ok(())
}

/// Check if a control is available on the device
pub fn has_control(device_path: &str, control_id: u32) -> bool {
    query_control(device_path, control_id)
        .map(|info| !info.is_disabled())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_id_values() {
        assert_eq!(V4L2_CID_FOCUS_AUTO, 0x009a090c);
        assert_eq!(V4L2_CID_CAMERA_ORIENTATION, 0x009a0922);
        assert_eq!(V4L2_CID_CAMERA_SENSOR_ROTATION, 0x009a0923);
    }

    #[test]
    fn test_missing_device() {
        assert!(
            query_control("/dev/nonexistent-video", V4L2_CID_FOCUS_AUTO).is_none()
        );
        assert!(
            get_control("/dev/nonexistent-video", V4L2_CID_FOCUS_AUTO).is_none()
        );
        assert!(
            set_control("/dev/nonexistent-video", V4L2_CID_FOCUS_AUTO, 1).is_err()
        );
    }

    #[test]
    fn test_extract_name() {
        let mut raw = [0u8; 32];
        raw[..5].copy_from_slice(b"Focus");
        assert_eq!(extract_name(&raw), "Focus");
    }
}
