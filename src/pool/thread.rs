use crate::encode::encoder::Frame;
use crate::foundation::core::{ClientId, ImageId, Rect};
use crate::foundation::error::{PaintError, PaintResult};
use crate::pool::context::{ContextReply, ContextRequest, ContextSpawner, RenderRequest};
use crate::render::surface::Bitmap;
use std::collections::HashSet;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

/// Identifies one dispatch. A reply resolves its ticket at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DispatchTicket(pub u64);

#[derive(Debug)]
struct InFlight {
    ticket: DispatchTicket,
    client: ClientId,
    seq: u64,
    dirty: Vec<Rect>,
    started: Instant,
}

/// Completion of a dispatched frame, as seen by the scheduler.
#[derive(Debug)]
pub enum ThreadEvent {
    Painted {
        client: ClientId,
        seq: u64,
        bitmap: Bitmap,
        dirty: Vec<Rect>,
    },
    Faulted {
        client: ClientId,
        seq: u64,
        reason: String,
    },
}

impl ThreadEvent {
    pub fn client(&self) -> ClientId {
        match self {
            Self::Painted { client, .. } | Self::Faulted { client, .. } => *client,
        }
    }
}

/// One pool slot and the context generation currently behind it.
///
/// The slot remembers which images its context already holds so a frame only carries images
/// that context has never received. Recycling the context starts a new generation with an empty
/// set; replies from older generations are ignored.
#[derive(Debug)]
pub struct RenderThread {
    slot: usize,
    generation: u64,
    link: Option<Sender<ContextRequest>>,
    sent: HashSet<ImageId>,
    in_flight: Option<InFlight>,
}

impl RenderThread {
    pub fn new(
        slot: usize,
        spawner: &dyn ContextSpawner,
        replies: &Sender<ContextReply>,
    ) -> PaintResult<Self> {
        let link = spawner.spawn(slot, 0, replies.clone())?;
        Ok(Self {
            slot,
            generation: 0,
            link: Some(link),
            sent: HashSet::new(),
            in_flight: None,
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// A context is behind this slot. False after a recycle whose spawn failed.
    pub fn has_context(&self) -> bool {
        self.link.is_some()
    }

    /// Idle with a live context, so it can take a frame.
    pub fn is_ready(&self) -> bool {
        self.is_idle() && self.has_context()
    }

    /// Client whose frame is currently executing here.
    pub fn in_flight_client(&self) -> Option<ClientId> {
        self.in_flight.as_ref().map(|f| f.client)
    }

    pub fn has_sent(&self, id: ImageId) -> bool {
        self.sent.contains(&id)
    }

    /// Move `frame` into this slot's context. Returns the number of images transferred.
    ///
    /// An error means the context is unreachable; the frame is dropped and the slot should be
    /// recycled.
    pub fn run(&mut self, frame: Frame, ticket: DispatchTicket) -> PaintResult<usize> {
        if !self.is_idle() {
            return Err(PaintError::context(format!("slot {} is busy", self.slot)));
        }
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| PaintError::context(format!("slot {} has no context", self.slot)))?;

        let Frame {
            client,
            seq,
            segments,
            images,
            dirty,
            ..
        } = frame;
        let (image_ids, images): (Vec<ImageId>, Vec<_>) = images
            .into_iter()
            .filter(|(id, _)| !self.sent.contains(id))
            .unzip();
        let transferred = image_ids.len();

        link.send(ContextRequest::Render(RenderRequest {
            ticket,
            buffers: segments,
            images,
            image_ids: image_ids.clone(),
        }))
        .map_err(|_| PaintError::context(format!("context {} disconnected", self.slot)))?;

        self.sent.extend(image_ids);
        self.in_flight = Some(InFlight {
            ticket,
            client,
            seq,
            dirty,
            started: Instant::now(),
        });
        Ok(transferred)
    }

    /// Match a reply against the frame in flight. Stale or duplicate replies yield `None`.
    pub fn resolve(&mut self, reply: ContextReply) -> Option<ThreadEvent> {
        let current = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.ticket == reply.ticket);
        if reply.generation != self.generation || !current {
            tracing::debug!(
                slot = self.slot,
                generation = reply.generation,
                ticket = reply.ticket.0,
                "stale context reply dropped"
            );
            return None;
        }
        let done = self.in_flight.take()?;
        Some(match reply.outcome {
            Ok(bitmap) => ThreadEvent::Painted {
                client: done.client,
                seq: done.seq,
                bitmap,
                dirty: done.dirty,
            },
            Err(reason) => ThreadEvent::Faulted {
                client: done.client,
                seq: done.seq,
                reason,
            },
        })
    }

    /// Fault the frame in flight if it has run longer than `timeout`.
    pub fn check_timeout(&mut self, now: Instant, timeout: Duration) -> Option<ThreadEvent> {
        let expired = self
            .in_flight
            .as_ref()
            .is_some_and(|f| now.saturating_duration_since(f.started) > timeout);
        if !expired {
            return None;
        }
        let done = self.in_flight.take()?;
        Some(ThreadEvent::Faulted {
            client: done.client,
            seq: done.seq,
            reason: format!("no reply within {} ms", timeout.as_millis()),
        })
    }

    /// Abandon the current context and start a fresh generation.
    ///
    /// On error the slot is left without a context until a later recycle succeeds.
    pub fn recycle(
        &mut self,
        spawner: &dyn ContextSpawner,
        replies: &Sender<ContextReply>,
    ) -> PaintResult<()> {
        self.shutdown();
        self.generation += 1;
        self.sent.clear();
        self.in_flight = None;
        self.link = Some(spawner.spawn(self.slot, self.generation, replies.clone())?);
        tracing::info!(
            slot = self.slot,
            generation = self.generation,
            "render context recycled"
        );
        Ok(())
    }

    /// Tell the context to drop evicted images it holds.
    pub fn forget_images(&mut self, ids: &[ImageId]) {
        let held: Vec<ImageId> = ids.iter().copied().filter(|id| self.sent.remove(id)).collect();
        if held.is_empty() {
            return;
        }
        if let Some(link) = &self.link {
            let _ = link.send(ContextRequest::Forget { image_ids: held });
        }
    }

    fn shutdown(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.send(ContextRequest::Shutdown);
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pool/thread.rs"]
mod tests;
