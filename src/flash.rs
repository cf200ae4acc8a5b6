// SPDX-License-Identifier: GPL-3.0-only

//! Torch LED control via Linux sysfs
//!
//! V4L2 cameras expose no flash control of their own, so torch mode drives the
//! LEDs at `/sys/class/leds/*:flash` through their `brightness` file.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LEDS_DIR: &str = "/sys/class/leds";

/// A flash LED discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    /// Maximum brightness value (from `max_brightness` file)
    max_brightness: u32,
    /// Directory basename
    name: String,
}

impl FlashDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }
}

/// Result of torch LED detection
///
/// Separates "hardware exists" from "we can control it" so a caller can
/// report a permission problem instead of silently claiming there is no torch.
#[derive(Debug, Default)]
pub struct FlashHardware {
    /// Devices we can actually control (writable)
    pub devices: Vec<FlashDevice>,
    /// Set when LEDs exist but none are writable
    pub permission_error: Option<String>,
}

impl FlashHardware {
    /// Scan `/sys/class/leds/` for `*:flash` entries
    pub fn detect() -> FlashHardware {
        Self::detect_in(Path::new(LEDS_DIR))
    }

    /// Scan `leds_dir` for `*:flash` entries
    pub fn detect_in(leds_dir: &Path) -> FlashHardware {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            debug!(dir = %leds_dir.display(), "No LED class directory, torch unavailable");
            return FlashHardware::default();
        };

        let mut devices = Vec::new();
        let mut unwritable: Vec<PathBuf> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };
            if !name_str.ends_with(":flash") {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let Some(max_brightness) = read_max_brightness(&led_path) else {
                continue;
            };

            match std::fs::OpenOptions::new().write(true).open(&brightness_path) {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered flash LED");
                    devices.push(FlashDevice {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        path = %brightness_path.display(),
                        error = %e,
                        "Flash LED found but not writable"
                    );
                    unwritable.push(brightness_path);
                }
            }
        }

        // white before yellow
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        let permission_error = (devices.is_empty() && !unwritable.is_empty())
            .then(|| permission_message(&unwritable));

        FlashHardware {
            devices,
            permission_error,
        }
    }

    /// Whether any controllable LED was found
    pub fn has_devices(&self) -> bool {
        !self.devices.is_empty()
    }

    /// Turn every LED on at full brightness
    pub fn all_on(&self) -> io::Result<()> {
        self.for_each(|dev| dev.torch(1.0))
    }

    /// Turn every LED off
    pub fn all_off(&self) -> io::Result<()> {
        self.for_each(FlashDevice::off)
    }

    /// Apply `op` to every LED, returning the first failure after trying all
    fn for_each(&self, op: impl Fn(&FlashDevice) -> io::Result<()>) -> io::Result<()> {
        let mut first_error = None;
        for dev in &self.devices {
            if let Err(e) = op(dev) {
                warn!(device = %dev.name, error = %e, "Failed to drive flash LED");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn read_max_brightness(led_path: &Path) -> Option<u32> {
    let path = led_path.join("max_brightness");
    match std::fs::read_to_string(&path) {
        Ok(s) => match s.trim().parse::<u32>() {
            Ok(v) if v > 0 => Some(v),
            _ => {
                warn!(path = %path.display(), "Invalid max_brightness value");
                None
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read max_brightness");
            None
        }
    }
}

/// Describe the group a user must join to drive the LEDs
fn permission_message(unwritable: &[PathBuf]) -> String {
    let username = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

    let group = unwritable
        .first()
        .and_then(|path| {
            let gid = std::fs::metadata(path).ok()?.gid();
            let groups = std::fs::read_to_string("/etc/group").ok()?;
            groups.lines().find_map(|line| {
                let parts: Vec<&str> = line.split(':').collect();
                (parts.len() >= 3 && parts[2].parse::<u32>().ok() == Some(gid))
                    .then(|| parts[0].to_string())
            })
        })
        .unwrap_or_else(|| "feedbackd".to_string());

    format!("Flash LEDs detected but not writable; add {username} to the '{group}' group")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_led(root: &Path, name: &str, max: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("max_brightness"), max).unwrap();
        std::fs::write(dir.join("brightness"), "0").unwrap();
        dir
    }

    #[test]
    fn test_detects_only_flash_leds() {
        let root = tempfile::tempdir().unwrap();
        fake_led(root.path(), "yellow:flash", "255\n");
        fake_led(root.path(), "white:flash", "100\n");
        fake_led(root.path(), "input0::capslock", "1\n");
        fake_led(root.path(), "red:flash", "0\n");

        let hw = FlashHardware::detect_in(root.path());
        let names: Vec<&str> = hw.devices.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["white:flash", "yellow:flash"]);
        assert!(hw.permission_error.is_none());
    }

    #[test]
    fn test_torch_writes_brightness() {
        let root = tempfile::tempdir().unwrap();
        let led = fake_led(root.path(), "white:flash", "200");
        let hw = FlashHardware::detect_in(root.path());

        hw.all_on().unwrap();
        assert_eq!(
            std::fs::read_to_string(led.join("brightness")).unwrap(),
            "200"
        );
        hw.all_off().unwrap();
        assert_eq!(
            std::fs::read_to_string(led.join("brightness")).unwrap(),
            "0"
        );
    }

    #[test]
    fn test_missing_directory_means_no_torch() {
        let hw = FlashHardware::detect_in(Path::new("/nonexistent/leds"));
        assert!(!hw.has_devices());
        assert!(hw.permission_error.is_none());
    }
}
