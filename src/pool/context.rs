use crate::foundation::core::ImageId;
use crate::foundation::error::{PaintError, PaintResult};
use crate::pool::thread::DispatchTicket;
use crate::render::executor::Executor;
use crate::render::surface::{Bitmap, RasterSnapshot};
use crate::render::vello::VelloSurface;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};

/// Per-context rendering options, shared by every context a spawner creates.
#[derive(Clone, Debug, Default)]
pub struct ContextOpts {
    /// Font used for `fill_text`/`stroke_text`. Text draws are skipped without one.
    pub font: Option<Arc<Vec<u8>>>,
    /// Colour a canvas is filled with on every resize. Transparent when `None`.
    pub clear_rgba: Option<[u8; 4]>,
}

/// One frame's worth of work, moved into a context.
#[derive(Debug)]
pub struct RenderRequest {
    pub ticket: DispatchTicket,
    pub buffers: Vec<Vec<u8>>,
    /// Images this context has not seen yet, parallel to `image_ids`.
    pub images: Vec<RasterSnapshot>,
    pub image_ids: Vec<ImageId>,
}

#[derive(Debug)]
pub enum ContextRequest {
    Render(RenderRequest),
    Forget { image_ids: Vec<ImageId> },
    Shutdown,
}

/// Exactly one reply per [`ContextRequest::Render`].
#[derive(Debug)]
pub struct ContextReply {
    pub slot: usize,
    pub generation: u64,
    pub ticket: DispatchTicket,
    pub outcome: Result<Bitmap, String>,
}

/// Creates the execution context behind a pool slot.
///
/// Returns the request side of a fresh context; the context answers on `replies`. Spawning a
/// new generation for a slot abandons the previous one.
pub trait ContextSpawner {
    fn spawn(
        &self,
        slot: usize,
        generation: u64,
        replies: Sender<ContextReply>,
    ) -> PaintResult<Sender<ContextRequest>>;
}

/// Spawns one OS thread per context, each with its own [`VelloSurface`].
#[derive(Clone, Debug, Default)]
pub struct WorkerSpawner {
    opts: ContextOpts,
}

impl WorkerSpawner {
    pub fn new(opts: ContextOpts) -> Self {
        Self { opts }
    }
}

impl ContextSpawner for WorkerSpawner {
    fn spawn(
        &self,
        slot: usize,
        generation: u64,
        replies: Sender<ContextReply>,
    ) -> PaintResult<Sender<ContextRequest>> {
        let (tx, rx) = std::sync::mpsc::channel();
        let opts = self.opts.clone();
        std::thread::Builder::new()
            .name(format!("paintpool-ctx-{slot}"))
            .spawn(move || serve(slot, generation, &opts, rx, replies))
            .map_err(|e| PaintError::context(format!("spawn context thread {slot}: {e}")))?;
        tracing::info!(slot, generation, "render context started");
        Ok(tx)
    }
}

/// Context main loop. Returns when the slot hangs up, asks to shut down, or a frame panics.
fn serve(
    slot: usize,
    generation: u64,
    opts: &ContextOpts,
    requests: Receiver<ContextRequest>,
    replies: Sender<ContextReply>,
) {
    let mut exec = Executor::new(VelloSurface::new(opts));
    while let Ok(req) = requests.recv() {
        match req {
            ContextRequest::Render(job) => {
                let ticket = job.ticket;
                let outcome = catch_unwind(AssertUnwindSafe(|| render(&mut exec, job)));
                let poisoned = outcome.is_err();
                let outcome = outcome.map_err(|_| format!("context {slot} panicked"));
                if replies
                    .send(ContextReply {
                        slot,
                        generation,
                        ticket,
                        outcome,
                    })
                    .is_err()
                    || poisoned
                {
                    break;
                }
            }
            ContextRequest::Forget { image_ids } => exec.forget_images(&image_ids),
            ContextRequest::Shutdown => break,
        }
    }
    tracing::debug!(slot, generation, "render context stopped");
}

#[tracing::instrument(skip_all, fields(ticket = job.ticket.0, new_images = job.image_ids.len()))]
fn render(exec: &mut Executor<VelloSurface>, job: RenderRequest) -> Bitmap {
    for (id, snapshot) in job.image_ids.into_iter().zip(job.images) {
        exec.load_image(id, snapshot);
    }
    exec.run_frame(&job.buffers)
}

#[cfg(test)]
#[path = "../../tests/unit/pool/context.rs"]
mod tests;
