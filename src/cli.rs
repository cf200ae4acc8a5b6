// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Probing sizes, frame rates and resolution negotiation
//! - Printing orientation tables
//! - Running the pipeline headless

use camera_capture::backends::camera::types::{CaptureBackendType, Facing, SensorRotation, Size};
use camera_capture::backends::camera::{CameraDevice, CameraHardware, get_hardware};
use camera_capture::pipeline::callbacks::{ConsumerError, PreviewCallback, PreviewFrame};
use camera_capture::pipeline::orientation::{adjust_direction_code, resolve_orientation};
use camera_capture::pipeline::render::{HeadlessRenderer, RenderStats};
use camera_capture::pipeline::render_loop::RenderLoop;
use camera_capture::pipeline::size::select_closest_size;
use camera_capture::{CaptureConfig, CapturePipeline};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn hardware_for(config: &CaptureConfig, use_virtual: bool) -> Arc<dyn CameraHardware> {
    if use_virtual {
        get_hardware(CaptureBackendType::Virtual)
    } else {
        get_hardware(config.backend)
    }
}

/// List all available cameras
pub fn list_cameras(
    config: &CaptureConfig,
    use_virtual: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let hardware = hardware_for(config, use_virtual);
    let count = hardware.number_of_cameras();

    if count == 0 {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", hardware.backend_type());
    println!();
    for index in 0..count {
        let info = match hardware.camera_info(index) {
            Ok(info) => info,
            Err(e) => {
                println!("  [{}] <unavailable: {}>", index, e);
                continue;
            }
        };
        println!("  [{}] {}", index, info.name);
        println!("      Facing: {}", info.facing);
        println!("      Sensor orientation: {}", info.orientation);

        let mut device = CameraDevice::new(Arc::clone(&hardware));
        match device.open(index) {
            Ok(()) => {
                let torch = if device.is_torch_available() {
                    "yes"
                } else {
                    "no"
                };
                println!("      Torch: {}", torch);
                device.release();
            }
            Err(e) => println!("      Torch: unknown ({})", e),
        }
        println!();
    }

    Ok(())
}

/// Print supported sizes and frame rates, and the size `width`x`height` negotiates to
pub fn probe_camera(
    config: &CaptureConfig,
    camera_index: usize,
    width: u32,
    height: u32,
    use_virtual: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let hardware = hardware_for(config, use_virtual);
    let count = hardware.number_of_cameras();
    if count == 0 {
        return Err("No cameras found".into());
    }
    if camera_index >= count {
        return Err(format!(
            "Camera index {} out of range (0-{})",
            camera_index,
            count - 1
        )
        .into());
    }

    let mut device = CameraDevice::new(hardware);
    device.open(camera_index)?;
    let params = device.parameters()?;

    if let Some(info) = device.info() {
        println!("Camera: {} ({}, sensor {})", info.name, info.facing, info.orientation);
    }

    let sizes: Vec<String> = params
        .supported_preview_sizes
        .iter()
        .map(|size| size.to_string())
        .collect();
    println!("Preview sizes: {}", sizes.join(", "));

    let ranges: Vec<String> = params
        .supported_fps_ranges
        .iter()
        .map(|range| format!("{:.1}-{:.1} fps", range.min_hz(), range.max_hz()))
        .collect();
    println!("Frame rates: {}", ranges.join(", "));

    let formats: Vec<String> = params
        .supported_preview_formats
        .iter()
        .map(|format| format!("{:?}", format))
        .collect();
    println!("Preview formats: {}", formats.join(", "));

    let requested = Size::new(width, height);
    match select_closest_size(&params.supported_preview_sizes, requested) {
        Ok(size) => println!("Requested {} negotiates to {}", requested, size),
        Err(e) => println!("Requested {} used as-is ({})", requested, e),
    }

    device.release();
    Ok(())
}

/// Print rotation and mirroring for both facings at every display rotation
pub fn print_orientation_table(sensor_degrees: i32) -> Result<(), Box<dyn std::error::Error>> {
    if sensor_degrees.rem_euclid(90) != 0 {
        return Err(format!(
            "Sensor rotation {} is not a quarter turn",
            sensor_degrees
        )
        .into());
    }
    let sensor = SensorRotation::from_degrees_int(sensor_degrees);

    println!("Sensor mounted at {}", sensor);
    println!();
    println!("  {:<7} {:>8} {:>9} {:>7}", "facing", "display", "rotation", "mirror");
    for facing in [Facing::Back, Facing::Front] {
        for display in SensorRotation::ALL {
            let orientation = resolve_orientation(sensor, facing, display);
            println!(
                "  {:<7} {:>8} {:>8}° {:>7}",
                facing.to_string(),
                display.to_string(),
                orientation.rotation,
                orientation.mirror
            );
        }
    }

    println!();
    println!("Direction codes (front camera): ");
    let codes: Vec<String> = (0..4)
        .map(|dir| format!("{}→{}", dir, adjust_direction_code(Facing::Front, sensor, dir)))
        .collect();
    println!("  {}", codes.join("  "));
    Ok(())
}

/// Run the pipeline on a render loop with a headless renderer
pub fn run_preview(
    mut config: CaptureConfig,
    camera: Option<usize>,
    seconds: u64,
    use_virtual: bool,
    snapshot: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(index) = camera {
        config.initial_facing = Facing::from_index(index);
    }
    let hardware = hardware_for(&config, use_virtual);
    if hardware.number_of_cameras() == 0 {
        return Err("No cameras found".into());
    }

    let surface = config.target_size();
    let snapshot_dir = config.snapshot_dir();
    let stats = RenderStats::new();
    let factory = HeadlessRenderer::factory(Arc::clone(&stats));
    let render_loop = RenderLoop::spawn(move |redraw| {
        CapturePipeline::new(config, hardware, factory, redraw)
    });
    let handle = render_loop.handle();

    let raw_frames = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&raw_frames);
    let consumer: Arc<dyn PreviewCallback> = Arc::new(
        move |_frame: &PreviewFrame<'_>| -> Result<(), ConsumerError> {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
    );
    handle.set_preview_callback(Some(consumer))?;

    handle.surface_created()?;
    handle.surface_changed(surface.width, surface.height)?;
    handle.resume()?;

    let facing = if handle.is_front_camera()? {
        "front"
    } else {
        "back"
    };
    let torch = if handle.is_light_available()? {
        "available"
    } else {
        "unavailable"
    };
    println!(
        "Previewing {} camera, sensor at {}°, torch {}",
        facing,
        handle.camera_rotation()?,
        torch
    );

    for second in 1..=seconds {
        std::thread::sleep(Duration::from_secs(1));
        println!(
            "  [{:>3}s] {:5.1} fps rendered, {} raw frames",
            second,
            handle.render_fps()?,
            raw_frames.swap(0, Ordering::Relaxed)
        );
    }

    if snapshot {
        let path = handle.save_snapshot(snapshot_dir)?;
        println!("Snapshot saved to {}", path.display());
    }

    handle.pause()?;
    println!("Frames drawn: {}", stats.draws());
    Ok(())
}
