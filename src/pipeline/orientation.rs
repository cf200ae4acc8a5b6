// SPDX-License-Identifier: GPL-3.0-only

//! Rotation and mirroring needed to show captured frames upright

use crate::backends::camera::types::{Facing, SensorRotation};
use serde::{Deserialize, Serialize};

/// How captured content must be transformed before presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Orientation {
    /// Clockwise rotation to apply, one of 0/90/180/270
    pub rotation: u32,
    /// Mirror horizontally (front cameras)
    pub mirror: bool,
}

impl Orientation {
    pub fn rotation(&self) -> SensorRotation {
        SensorRotation::from_degrees_int(self.rotation as i32)
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.mirror {
            write!(f, "{}° mirrored", self.rotation)
        } else {
            write!(f, "{}°", self.rotation)
        }
    }
}

/// Compute the display transform for a camera
///
/// Front cameras are mirrored, so their rotation is measured the other way
/// round: `(360 - (sensor + display) % 360) % 360`. Back cameras use
/// `(sensor - display + 360) % 360`.
pub fn resolve_orientation(
    sensor: SensorRotation,
    facing: Facing,
    display: SensorRotation,
) -> Orientation {
    let sensor = sensor.degrees();
    let display = display.degrees();
    match facing {
        Facing::Front => Orientation {
            rotation: (360 - (sensor + display) % 360) % 360,
            mirror: true,
        },
        Facing::Back => Orientation {
            rotation: (sensor + 360 - display) % 360,
            mirror: false,
        },
    }
}

/// Adjust a raw-buffer direction code for front-camera sensor mounting
///
/// Direction codes are quarter-turn indices whose low bit tells portrait from
/// landscape. Front cameras mounted at 270° with an odd code, or at 90° with
/// an even code, get bit 1 flipped (`dir ^ 2`), i.e. a half-turn correction.
/// Every other combination returns `dir` unchanged.
///
/// This mirrors how common phone sensors are mounted and has not been checked
/// against every device; treat it as a calibration default.
pub fn adjust_direction_code(facing: Facing, sensor: SensorRotation, dir: u32) -> u32 {
    let odd = dir & 1 == 1;
    let flip = facing == Facing::Front
        && ((sensor == SensorRotation::Rotate270 && odd)
            || (sensor == SensorRotation::Rotate90 && !odd));
    if flip { dir ^ 2 } else { dir }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Facing::{Back, Front};
    use crate::backends::camera::types::SensorRotation::{
        None as R0, Rotate90 as R90, Rotate270 as R270,
    };

    fn expect(rotation: u32, mirror: bool) -> Orientation {
        Orientation { rotation, mirror }
    }

    #[test]
    fn test_common_phone_mountings() {
        assert_eq!(resolve_orientation(R270, Front, R0), expect(90, true));
        assert_eq!(resolve_orientation(R90, Back, R0), expect(90, false));
    }

    #[test]
    fn test_display_rotation_is_compensated() {
        assert_eq!(resolve_orientation(R90, Back, R90), expect(0, false));
        assert_eq!(resolve_orientation(R270, Front, R90), expect(0, true));
        assert_eq!(resolve_orientation(R0, Back, R270), expect(90, false));
    }

    #[test]
    fn test_total_over_domain() {
        for sensor in SensorRotation::ALL {
            for display in SensorRotation::ALL {
                for facing in [Facing::Front, Facing::Back] {
                    let first = resolve_orientation(sensor, facing, display);
                    let second = resolve_orientation(sensor, facing, display);
                    assert_eq!(first, second);
                    assert_eq!(first.rotation % 90, 0);
                    assert!(first.rotation < 360);
                    assert_eq!(first.mirror, facing == Facing::Front);
                }
            }
        }
    }

    #[test]
    fn test_direction_code_front_270() {
        let sensor = SensorRotation::Rotate270;
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 0), 0);
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 1), 3);
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 2), 2);
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 3), 1);
    }

    #[test]
    fn test_direction_code_front_90() {
        let sensor = SensorRotation::Rotate90;
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 0), 2);
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 1), 1);
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 2), 0);
        assert_eq!(adjust_direction_code(Facing::Front, sensor, 3), 3);
    }

    #[test]
    fn test_direction_code_untouched_for_back_and_upright_sensors() {
        for dir in 0..4 {
            for sensor in SensorRotation::ALL {
                assert_eq!(adjust_direction_code(Facing::Back, sensor, dir), dir);
            }
            assert_eq!(
                adjust_direction_code(Facing::Front, SensorRotation::None, dir),
                dir
            );
            assert_eq!(
                adjust_direction_code(Facing::Front, SensorRotation::Rotate180, dir),
                dir
            );
        }
    }
}
