// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for size negotiation and orientation resolution

use camera_capture::backends::camera::types::{Facing, SensorRotation, Size};
use camera_capture::errors::CaptureError;
use camera_capture::pipeline::orientation::{
    Orientation, adjust_direction_code, resolve_orientation,
};
use camera_capture::pipeline::size::{select_closest_size, size_distance};

fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
    list.iter().map(|&(w, h)| Size::new(w, h)).collect()
}

#[test]
fn test_closest_size_has_no_strictly_closer_entry() {
    let supported = sizes(&[
        (1920, 1080),
        (1280, 720),
        (1280, 960),
        (800, 600),
        (640, 480),
        (352, 288),
        (176, 144),
    ]);
    let requests = sizes(&[
        (1280, 720),
        (1000, 700),
        (1, 1),
        (4000, 3000),
        (720, 1280),
    ]);

    for requested in requests {
        let chosen = select_closest_size(&supported, requested).unwrap();
        assert!(supported.contains(&chosen));
        let best = size_distance(chosen, requested);
        assert!(
            supported.iter().all(|&s| size_distance(s, requested) >= best),
            "{} is not closest to {}",
            chosen,
            requested
        );
    }
}

#[test]
fn test_closest_size_tie_goes_to_first() {
    // both are 100 away from 700x500
    let supported = sizes(&[(800, 500), (600, 500)]);
    assert_eq!(
        select_closest_size(&supported, Size::new(700, 500)).unwrap(),
        Size::new(800, 500)
    );
}

#[test]
fn test_closest_size_empty_fails() {
    assert_eq!(
        select_closest_size(&[], Size::new(640, 480)),
        Err(CaptureError::NoSupportedSizes)
    );
}

#[test]
fn test_orientation_examples() {
    use SensorRotation::{None as Upright, Rotate90, Rotate270};

    assert_eq!(
        resolve_orientation(Rotate270, Facing::Front, Upright),
        Orientation {
            rotation: 90,
            mirror: true,
        }
    );
    assert_eq!(
        resolve_orientation(Rotate90, Facing::Back, Upright),
        Orientation {
            rotation: 90,
            mirror: false,
        }
    );
}

#[test]
fn test_orientation_total_over_domain() {
    // 4 sensor × 2 facing × 4 display combinations
    let mut seen = 0;
    for sensor in SensorRotation::ALL {
        for facing in [Facing::Back, Facing::Front] {
            for display in SensorRotation::ALL {
                let first = resolve_orientation(sensor, facing, display);
                let again = resolve_orientation(sensor, facing, display);
                assert_eq!(first, again);
                assert!([0, 90, 180, 270].contains(&first.rotation));
                assert_eq!(first.mirror, facing == Facing::Front);
                seen += 1;
            }
        }
    }
    assert_eq!(seen, 32);
}

#[test]
fn test_phone_cameras_agree_on_display_rotation() {
    use SensorRotation::{Rotate90, Rotate180, Rotate270};

    // Back at 90 and front at 270 need the same correction once the front is mirrored
    let back = resolve_orientation(Rotate90, Facing::Back, Rotate90);
    let front = resolve_orientation(Rotate270, Facing::Front, Rotate90);
    assert_eq!(back.rotation, 0);
    assert_eq!(front.rotation, 0);

    let back = resolve_orientation(Rotate90, Facing::Back, Rotate180);
    let front = resolve_orientation(Rotate270, Facing::Front, Rotate180);
    assert_eq!(back.rotation, 270);
    assert_eq!(front.rotation, 270);
}

#[test]
fn test_direction_code_parity_flip() {
    // front at 270: odd codes flip
    assert_eq!(
        adjust_direction_code(Facing::Front, SensorRotation::Rotate270, 1),
        3
    );
    assert_eq!(
        adjust_direction_code(Facing::Front, SensorRotation::Rotate270, 3),
        1
    );
    assert_eq!(
        adjust_direction_code(Facing::Front, SensorRotation::Rotate270, 2),
        2
    );
    // front at 90: even codes flip
    assert_eq!(
        adjust_direction_code(Facing::Front, SensorRotation::Rotate90, 0),
        2
    );
    assert_eq!(
        adjust_direction_code(Facing::Front, SensorRotation::Rotate90, 1),
        1
    );
    // back cameras and other mountings are untouched
    for dir in 0..4 {
        assert_eq!(
            adjust_direction_code(Facing::Back, SensorRotation::Rotate270, dir),
            dir
        );
        assert_eq!(
            adjust_direction_code(Facing::Front, SensorRotation::None, dir),
            dir
        );
    }
}
