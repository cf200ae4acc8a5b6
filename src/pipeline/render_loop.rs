// SPDX-License-Identifier: GPL-3.0-only

//! Dedicated render-loop thread owning a [`CapturePipeline`]
//!
//! Every mutation of the pipeline happens on this thread. Other threads send
//! closures through a [`PipelineHandle`]; the camera's delivery thread only
//! sends coalesced redraw requests.

use super::render::RedrawRequester;
use super::{CapturePipeline, SwitchOutcome};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::errors::{CaptureError, CaptureResult};
use crate::pipeline::callbacks::PreviewCallback;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, trace};

type Job = Box<dyn FnOnce(&mut CapturePipeline) + Send>;

enum Command {
    Run(Job),
    Redraw,
    Shutdown,
}

/// At most one queued redraw at a time
struct RedrawSignal {
    pending: AtomicBool,
    tx: UnboundedSender<Command>,
}

impl RedrawRequester for RedrawSignal {
    fn request_render(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.tx.send(Command::Redraw).is_err() {
            trace!("Render loop gone, redraw dropped");
        }
    }
}

/// Cloneable access to a pipeline living on a [`RenderLoop`]
#[derive(Clone)]
pub struct PipelineHandle {
    tx: UnboundedSender<Command>,
    redraw: Arc<RedrawSignal>,
}

impl PipelineHandle {
    /// Queue `job` on the render loop without waiting
    pub fn post<F>(&self, job: F) -> CaptureResult<()>
    where
        F: FnOnce(&mut CapturePipeline) + Send + 'static,
    {
        self.tx
            .send(Command::Run(Box::new(job)))
            .map_err(|_| CaptureError::RenderLoopClosed)
    }

    /// Run `job` on the render loop and wait for its result
    ///
    /// Must not be called from the render loop itself.
    pub fn run<F, R>(&self, job: F) -> CaptureResult<R>
    where
        F: FnOnce(&mut CapturePipeline) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move |pipeline| {
            let _ = reply_tx.send(job(pipeline));
        })?;
        reply_rx
            .blocking_recv()
            .map_err(|_| CaptureError::RenderLoopClosed)
    }

    pub fn request_render(&self) {
        self.redraw.request_render();
    }

    pub fn surface_created(&self) -> CaptureResult<()> {
        self.post(|pipeline| pipeline.on_surface_created())
    }

    pub fn surface_changed(&self, width: u32, height: u32) -> CaptureResult<()> {
        self.post(move |pipeline| pipeline.on_surface_changed(width, height))
    }

    pub fn resume(&self) -> CaptureResult<()> {
        self.run(|pipeline| pipeline.on_resume())?
    }

    pub fn pause(&self) -> CaptureResult<()> {
        self.run(|pipeline| pipeline.on_pause())
    }

    pub fn switch_camera(&self) -> CaptureResult<SwitchOutcome> {
        self.run(|pipeline| pipeline.switch_camera())?
    }

    pub fn enable_flash_light(&self, enabled: bool) -> CaptureResult<()> {
        self.post(move |pipeline| pipeline.enable_flash_light(enabled))
    }

    pub fn set_target_resolution(&self, width: u32, height: u32) -> CaptureResult<()> {
        self.post(move |pipeline| pipeline.set_target_resolution(width, height))
    }

    pub fn set_preview_callback(
        &self,
        callback: Option<Arc<dyn PreviewCallback>>,
    ) -> CaptureResult<()> {
        self.post(move |pipeline| pipeline.set_preview_callback(callback))
    }

    pub fn set_one_shot_preview_callback(
        &self,
        callback: Option<Arc<dyn PreviewCallback>>,
    ) -> CaptureResult<()> {
        self.post(move |pipeline| pipeline.set_one_shot_preview_callback(callback))
    }

    pub fn is_light_available(&self) -> CaptureResult<bool> {
        self.run(|pipeline| pipeline.is_light_available())
    }

    pub fn is_front_camera(&self) -> CaptureResult<bool> {
        self.run(|pipeline| pipeline.is_front_camera())
    }

    pub fn camera_rotation(&self) -> CaptureResult<u32> {
        self.run(|pipeline| pipeline.camera_rotation())
    }

    pub fn render_fps(&self) -> CaptureResult<f64> {
        self.run(|pipeline| pipeline.render_fps())
    }

    pub fn frames_rendered(&self) -> CaptureResult<u64> {
        self.run(|pipeline| pipeline.frames_rendered())
    }

    pub fn save_snapshot(&self, dir: PathBuf) -> CaptureResult<PathBuf> {
        self.run(move |pipeline| pipeline.save_snapshot(&dir))?
    }
}

/// The render-loop thread
///
/// Dropping it shuts the loop down and waits for the thread, which drops the
/// pipeline (and so releases the camera) on its way out.
pub struct RenderLoop {
    handle: PipelineHandle,
    controller: CaptureLoopController,
}

impl RenderLoop {
    /// Start the thread and build the pipeline on it
    ///
    /// `build` receives the redraw requester the pipeline must use.
    pub fn spawn<B>(build: B) -> Self
    where
        B: FnOnce(Arc<dyn RedrawRequester>) -> CapturePipeline + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let redraw = Arc::new(RedrawSignal {
            pending: AtomicBool::new(false),
            tx: tx.clone(),
        });
        let requester: Arc<dyn RedrawRequester> = redraw.clone();
        let loop_redraw = Arc::clone(&redraw);

        let controller = CaptureLoopController::start_with_init(
            "render-loop",
            move || Ok::<_, String>((build(requester), rx)),
            move |state: &mut (CapturePipeline, UnboundedReceiver<Command>)| {
                let (pipeline, rx) = state;
                match rx.blocking_recv() {
                    Some(Command::Run(job)) => job(pipeline),
                    Some(Command::Redraw) => {
                        loop_redraw.pending.store(false, Ordering::SeqCst);
                        pipeline.on_draw_frame();
                    }
                    Some(Command::Shutdown) | None => {
                        debug!("Render loop shutting down");
                        return LoopAction::Stop;
                    }
                }
                LoopAction::Continue
            },
        );

        Self {
            handle: PipelineHandle { tx, redraw },
            controller,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Command::Shutdown);
        self.controller.stop();
    }
}
