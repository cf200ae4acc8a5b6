// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture pipeline on virtual cameras

use camera_capture::backends::camera::types::{Facing, SensorRotation, Size};
use camera_capture::backends::camera::virtual_camera::{
    Faults, VirtualCameraModel, VirtualHardware,
};
use camera_capture::backends::camera::{CameraDevice, CameraHardware, DeviceState};
use camera_capture::errors::CaptureError;
use camera_capture::pipeline::callbacks::{ConsumerError, PreviewCallback, PreviewFrame};
use camera_capture::pipeline::fps::ManualClock;
use camera_capture::pipeline::render::{HeadlessRenderer, RenderStats};
use camera_capture::{CaptureConfig, CapturePipeline, SwitchOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Harness {
    hardware: Arc<VirtualHardware>,
    stats: Arc<RenderStats>,
    clock: ManualClock,
    pipeline: CapturePipeline,
}

fn harness(hardware: VirtualHardware) -> Harness {
    harness_with(hardware, CaptureConfig::default())
}

fn harness_with(hardware: VirtualHardware, config: CaptureConfig) -> Harness {
    let hardware = Arc::new(hardware.manual_delivery());
    let stats = RenderStats::new();
    let clock = ManualClock::new(1_000);
    let pipeline = CapturePipeline::with_clock(
        config,
        Arc::clone(&hardware) as Arc<dyn CameraHardware>,
        HeadlessRenderer::factory(Arc::clone(&stats)),
        Arc::new(|| {}),
        Box::new(clock.clone()),
    );
    Harness {
        hardware,
        stats,
        clock,
        pipeline,
    }
}

/// Surface created and sized, then resumed: the usual startup order
fn start(h: &mut Harness) {
    h.pipeline.on_surface_created();
    h.pipeline.on_surface_changed(720, 1280);
    h.pipeline.on_resume().unwrap();
}

#[test]
fn test_pause_twice_is_noop() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);

    h.pipeline.on_pause();
    let deleted = h.stats.textures_deleted();
    h.pipeline.on_pause();

    assert!(h.pipeline.is_paused());
    assert!(h.hardware.probe().open_indices().is_empty());
    assert_eq!(h.stats.textures_deleted(), deleted);
}

#[test]
fn test_release_on_closed_device_is_noop() {
    let hardware: Arc<dyn CameraHardware> = Arc::new(VirtualHardware::phone());
    let mut device = CameraDevice::new(hardware);
    device.release();
    device.release();
    assert_eq!(device.state(), DeviceState::Closed);
}

#[test]
fn test_resume_after_pause_reopens_and_draws() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);
    h.pipeline.on_pause();
    h.pipeline.on_resume().unwrap();

    assert_eq!(h.hardware.probe().open_indices(), vec![1]);
    assert_eq!(h.hardware.probe().open_history(), vec![1, 1]);
    h.hardware.deliver_frames(1);
    assert!(h.pipeline.on_draw_frame());
}

#[test]
fn test_switch_leaves_exactly_one_camera_open() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);

    for expected in [Facing::Back, Facing::Front, Facing::Back] {
        assert_eq!(h.pipeline.switch_camera().unwrap(), SwitchOutcome::Switched);
        let open = h.hardware.probe().open_indices();
        assert_eq!(open, vec![expected.index()]);
        assert_eq!(h.pipeline.device().facing(), Some(expected));
    }
}

#[test]
fn test_switch_while_paused_applies_on_resume() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);
    h.pipeline.on_pause();

    assert_eq!(h.pipeline.switch_camera().unwrap(), SwitchOutcome::Switched);
    assert!(h.hardware.probe().open_indices().is_empty());

    h.pipeline.on_resume().unwrap();
    assert_eq!(h.hardware.probe().open_indices(), vec![0]);
    assert!(!h.pipeline.is_front_camera());
}

#[test]
fn test_single_camera_resumes_on_back_index() {
    let webcam = VirtualCameraModel::new("USB Webcam", Facing::Front, SensorRotation::None);
    let mut h = harness(VirtualHardware::new(vec![webcam]));
    start(&mut h);

    assert_eq!(h.hardware.probe().open_indices(), vec![0]);
    assert_eq!(h.pipeline.switch_camera().unwrap(), SwitchOutcome::Skipped);
    assert_eq!(h.hardware.probe().open_history(), vec![0]);
}

#[test]
fn test_raw_buffer_returned_even_when_consumer_panics() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let consumer: Arc<dyn PreviewCallback> =
        Arc::new(move |_frame: &PreviewFrame<'_>| -> Result<(), ConsumerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("consumer bug");
        });
    h.pipeline.set_preview_callback(Some(consumer));

    let pool = h.hardware.probe().buffer_pool().unwrap();
    assert_eq!(pool.available(), 1);
    h.hardware.deliver_frames(3);

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(pool.available(), 1);
    assert_eq!(h.hardware.probe().raw_frames_dropped(), 0);
}

#[test]
fn test_raw_frame_metadata() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);

    let seen = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&seen);
    let consumer: Arc<dyn PreviewCallback> =
        Arc::new(move |frame: &PreviewFrame<'_>| -> Result<(), ConsumerError> {
            *slot.lock().unwrap() = Some((frame.format(), frame.rotation, frame.timestamp_ns));
            Ok(())
        });
    h.pipeline.set_preview_callback(Some(consumer));
    h.hardware.deliver_frames(1);

    let (format, rotation, _) = seen.lock().unwrap().unwrap();
    assert_eq!(format, Some(h.pipeline.device().preview_format()));
    assert_eq!(rotation, h.pipeline.camera_rotation());
}

#[test]
fn test_no_draw_when_paused_or_closed() {
    let mut h = harness(VirtualHardware::phone());

    // nothing open yet
    h.pipeline.on_surface_created();
    h.pipeline.on_surface_changed(720, 1280);
    assert!(!h.pipeline.on_draw_frame());

    h.pipeline.on_resume().unwrap();
    h.hardware.deliver_frames(1);
    h.pipeline.on_pause();
    assert!(!h.pipeline.on_draw_frame());

    assert_eq!(h.stats.draws(), 0);
    assert_eq!(h.pipeline.frames_rendered(), 0);
}

#[test]
fn test_render_fps_same_millisecond_keeps_count() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);
    h.pipeline.on_surface_created();

    for _ in 0..10 {
        h.hardware.deliver_frames(1);
        assert!(h.pipeline.on_draw_frame());
    }
    assert_eq!(h.pipeline.render_fps(), 0.0);
    assert_eq!(h.pipeline.render_fps(), 0.0);

    h.clock.advance(1_000);
    assert_eq!(h.pipeline.render_fps(), 10.0);
    h.clock.advance(1_000);
    assert_eq!(h.pipeline.render_fps(), 0.0);
}

#[test]
fn test_open_failure_surfaces_device_unavailable() {
    let mut h = harness(VirtualHardware::phone());
    h.hardware.set_faults(Faults {
        fail_open: true,
        ..Faults::default()
    });

    h.pipeline.on_surface_created();
    h.pipeline.on_surface_changed(720, 1280);
    assert!(matches!(
        h.pipeline.on_resume(),
        Err(CaptureError::DeviceUnavailable(_))
    ));
    assert!(!h.pipeline.device().is_open());
    assert!(!h.pipeline.on_draw_frame());
}

#[test]
fn test_bind_failure_keeps_device_open() {
    let mut h = harness(VirtualHardware::phone());
    h.hardware.set_faults(Faults {
        fail_bind: true,
        ..Faults::default()
    });

    h.pipeline.on_surface_created();
    h.pipeline.on_surface_changed(720, 1280);
    assert!(matches!(
        h.pipeline.on_resume(),
        Err(CaptureError::PreviewBindError(_))
    ));
    assert_eq!(h.pipeline.device().state(), DeviceState::Open);
}

#[test]
fn test_rejected_parameters_are_absorbed() {
    let mut h = harness(VirtualHardware::phone());
    h.hardware.set_faults(Faults {
        reject_parameters: true,
        ..Faults::default()
    });
    start(&mut h);

    assert_eq!(h.pipeline.device().state(), DeviceState::Previewing);
    h.pipeline.enable_flash_light(true);
    h.hardware.deliver_frames(1);
    assert!(h.pipeline.on_draw_frame());
}

#[test]
fn test_camera_without_sizes_uses_target() {
    let bare = VirtualCameraModel::new("Bare", Facing::Back, SensorRotation::Rotate90)
        .with_preview_sizes(Vec::new());
    let mut h = harness_with(
        VirtualHardware::new(vec![bare]),
        CaptureConfig {
            target_width: 480,
            target_height: 640,
            ..CaptureConfig::default()
        },
    );
    start(&mut h);

    // requested in sensor orientation
    assert_eq!(
        h.pipeline.device().preview_size(),
        Some(Size::new(640, 480))
    );
    assert_eq!(h.pipeline.image_size(), Size::new(480, 640));
}

#[test]
fn test_torch_follows_back_camera() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);
    assert!(!h.pipeline.is_light_available());

    h.pipeline.switch_camera().unwrap();
    assert!(h.pipeline.is_light_available());
    h.pipeline.enable_flash_light(true);
    let params = h.pipeline.device().parameters().unwrap();
    assert_eq!(
        params.flash_mode,
        Some(camera_capture::backends::camera::types::FlashMode::Torch)
    );
}

#[test]
fn test_target_resolution_applies_on_next_setup() {
    let mut h = harness(VirtualHardware::phone());
    start(&mut h);
    assert_eq!(
        h.pipeline.device().preview_size(),
        Some(Size::new(1280, 720))
    );

    h.pipeline.set_target_resolution(480, 640);
    assert_eq!(
        h.pipeline.device().preview_size(),
        Some(Size::new(1280, 720))
    );

    h.pipeline.on_surface_changed(720, 1280);
    assert_eq!(
        h.pipeline.device().preview_size(),
        Some(Size::new(640, 480))
    );
}
