use crate::encode::encoder::{Encoder, Frame};
use crate::encode::registry::{ImageRegistry, SharedRegistry};
use crate::foundation::config::PipelineOpts;
use crate::foundation::core::{CallbackId, ClientId, Rect};
use crate::foundation::error::{PaintError, PaintResult};
use crate::pool::context::{ContextReply, ContextSpawner, WorkerSpawner};
use crate::pool::thread::{DispatchTicket, RenderThread, ThreadEvent};
use crate::render::surface::Bitmap;
use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

/// Which queued frame an idle thread takes next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Most recently committed frame first.
    #[default]
    NewestFirst,
    /// Rotate over clients, starting after the last one served.
    RoundRobin,
}

/// Receives each painted bitmap of one client together with its dirty regions.
pub type PaintedFn = Box<dyn FnMut(Bitmap, &[Rect])>;
/// Per-tick drawing callback.
pub type FrameCallback = Box<dyn FnOnce(&mut FrameCtx<'_>)>;

/// What a frame callback sees on a host tick.
pub struct FrameCtx<'a> {
    /// Host timestamp of this tick.
    pub now_ms: f64,
    /// Time since this client's previous tick; zero on its first.
    pub delta_ms: f64,
    /// Number of ticks this client has drawn before this one.
    pub frame: u64,
    pub encoder: &'a mut Encoder,
    requested: &'a mut Vec<(CallbackId, FrameCallback)>,
    next_callback: &'a mut u64,
}

impl FrameCtx<'_> {
    /// Queue `callback` for this client's next tick.
    pub fn request_next_frame(
        &mut self,
        callback: impl FnOnce(&mut FrameCtx<'_>) + 'static,
    ) -> CallbackId {
        let id = CallbackId(*self.next_callback);
        *self.next_callback += 1;
        self.requested.push((id, Box::new(callback)));
        id
    }
}

/// Handle for one registered client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Raf {
    client: ClientId,
}

impl Raf {
    pub fn client(&self) -> ClientId {
        self.client
    }
}

/// Pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStats {
    pub committed: u64,
    pub dispatched: u64,
    pub painted: u64,
    pub superseded: u64,
    pub faulted: u64,
    pub images_sent: u64,
    pub contexts_recycled: u64,
}

struct ClientRecord {
    on_painted: PaintedFn,
    encoder: Encoder,
    pending: Vec<(CallbackId, FrameCallback)>,
    /// Set while a frame committed on a tick is queued or painting.
    locked: bool,
    last_tick_ms: Option<f64>,
    frames: u64,
}

/// Multiplexes per-client frame requests onto one host tick and drains the
/// committed frames into a fixed pool of render threads.
///
/// Everything here runs on the host thread. Contexts are only reached through
/// messages; their replies are picked up by [`Scheduler::poll`] or [`Scheduler::wait`].
pub struct Scheduler {
    opts: PipelineOpts,
    registry: SharedRegistry,
    clients: BTreeMap<ClientId, ClientRecord>,
    next_client: u32,
    next_callback: u64,
    next_seq: u64,
    next_ticket: u64,
    backlog: Vec<Frame>,
    threads: Vec<RenderThread>,
    spawner: Box<dyn ContextSpawner>,
    reply_tx: Sender<ContextReply>,
    reply_rx: Receiver<ContextReply>,
    tick_requested: bool,
    host_hook: Option<Box<dyn FnMut()>>,
    last_served: Option<ClientId>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Build a scheduler backed by real worker threads.
    pub fn new(opts: PipelineOpts) -> PaintResult<Self> {
        opts.validate()?;
        let spawner = WorkerSpawner::new(opts.context_opts()?);
        Self::with_spawner(opts, Box::new(spawner))
    }

    pub fn with_spawner(opts: PipelineOpts, spawner: Box<dyn ContextSpawner>) -> PaintResult<Self> {
        opts.validate()?;
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        let threads = (0..opts.threads)
            .map(|slot| RenderThread::new(slot, spawner.as_ref(), &reply_tx))
            .collect::<PaintResult<Vec<_>>>()?;
        tracing::info!(
            threads = threads.len(),
            policy = ?opts.dispatch_policy,
            "render pool ready"
        );
        Ok(Self {
            opts,
            registry: ImageRegistry::shared(),
            clients: BTreeMap::new(),
            next_client: 0,
            next_callback: 0,
            next_seq: 0,
            next_ticket: 0,
            backlog: Vec::new(),
            threads,
            spawner,
            reply_tx,
            reply_rx,
            tick_requested: false,
            host_hook: None,
            last_served: None,
            stats: SchedulerStats::default(),
        })
    }

    /// Invoked once each time a host tick becomes requested.
    pub fn set_host_hook(&mut self, hook: impl FnMut() + 'static) {
        self.host_hook = Some(Box::new(hook));
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn tick_requested(&self) -> bool {
        self.tick_requested
    }

    pub fn queued(&self) -> usize {
        self.backlog.len()
    }

    pub fn in_flight(&self) -> usize {
        self.threads.iter().filter(|t| !t.is_idle()).count()
    }

    /// Nothing queued, nothing painting, no tick outstanding.
    pub fn is_settled(&self) -> bool {
        self.backlog.is_empty() && self.in_flight() == 0 && !self.tick_requested
    }

    /// Register a client. `on_painted` receives every bitmap painted for it.
    pub fn get_raf(&mut self, on_painted: impl FnMut(Bitmap, &[Rect]) + 'static) -> Raf {
        let client = ClientId(self.next_client);
        self.next_client += 1;
        let encoder = Encoder::new(client, self.opts.encoder_opts(), self.registry.clone());
        self.clients.insert(
            client,
            ClientRecord {
                on_painted: Box::new(on_painted),
                encoder,
                pending: Vec::new(),
                locked: false,
                last_tick_ms: None,
                frames: 0,
            },
        );
        tracing::debug!(client = client.0, "client registered");
        Raf { client }
    }

    pub fn request_next_frame(
        &mut self,
        raf: Raf,
        callback: impl FnOnce(&mut FrameCtx<'_>) + 'static,
    ) -> PaintResult<CallbackId> {
        let record = self
            .clients
            .get_mut(&raf.client)
            .ok_or_else(|| PaintError::validation(format!("unknown client {}", raf.client.0)))?;
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        record.pending.push((id, Box::new(callback)));
        self.request_tick();
        Ok(id)
    }

    /// Withdraw a callback that has not fired yet.
    pub fn cancel(&mut self, raf: Raf, id: CallbackId) -> bool {
        let Some(record) = self.clients.get_mut(&raf.client) else {
            return false;
        };
        let before = record.pending.len();
        record.pending.retain(|(cb, _)| *cb != id);
        before != record.pending.len()
    }

    /// Forget a client and its queued work. A frame already painting still completes.
    pub fn unregister(&mut self, raf: Raf) -> bool {
        if self.clients.remove(&raf.client).is_none() {
            return false;
        }
        let before = self.backlog.len();
        self.backlog.retain(|f| f.client != raf.client);
        tracing::debug!(
            client = raf.client.0,
            dropped_frames = before - self.backlog.len(),
            "client unregistered"
        );
        true
    }

    pub fn encoder(&mut self, raf: Raf) -> Option<&mut Encoder> {
        self.clients.get_mut(&raf.client).map(|c| &mut c.encoder)
    }

    fn request_tick(&mut self) {
        if self.tick_requested {
            return;
        }
        self.tick_requested = true;
        if let Some(hook) = self.host_hook.as_mut() {
            hook();
        }
    }

    /// Run every unlocked client's pending callbacks, then queue and dispatch what they committed.
    #[tracing::instrument(skip(self), fields(clients = self.clients.len()))]
    pub fn on_host_tick(&mut self, now_ms: f64) {
        self.tick_requested = false;
        let mut next_callback = self.next_callback;
        let mut committed = Vec::new();
        for record in self.clients.values_mut() {
            if !record.locked && !record.pending.is_empty() {
                let callbacks = std::mem::take(&mut record.pending);
                let delta_ms = record.last_tick_ms.map_or(0.0, |t| now_ms - t);
                record.last_tick_ms = Some(now_ms);
                let mut requested = Vec::new();
                let mut ctx = FrameCtx {
                    now_ms,
                    delta_ms,
                    frame: record.frames,
                    encoder: &mut record.encoder,
                    requested: &mut requested,
                    next_callback: &mut next_callback,
                };
                for (_, callback) in callbacks {
                    callback(&mut ctx);
                }
                record.frames += 1;
                record.pending.extend(requested);
            }
            let frames = record.encoder.take_committed();
            if !frames.is_empty() {
                record.locked = true;
                committed.extend(frames);
            }
        }
        self.next_callback = next_callback;

        for frame in committed {
            self.enqueue(frame);
        }
        self.evict_idle_images();
        if self.clients.values().any(|c| !c.pending.is_empty()) {
            self.request_tick();
        }
        self.drain();
    }

    fn enqueue(&mut self, mut frame: Frame) {
        frame.seq = self.next_seq;
        self.next_seq += 1;
        self.stats.committed += 1;
        if let Some(pos) = self.backlog.iter().position(|f| f.client == frame.client) {
            let old = self.backlog.remove(pos);
            self.stats.superseded += 1;
            tracing::debug!(client = old.client.0, seq = old.seq, "queued frame superseded");
        }
        self.backlog.push(frame);
    }

    fn evict_idle_images(&mut self) {
        let Some(idle) = self.opts.image_idle_commits else {
            return;
        };
        let evicted = self.registry.borrow_mut().evict_idle(idle);
        if evicted.is_empty() {
            return;
        }
        tracing::debug!(count = evicted.len(), "idle images evicted");
        for thread in &mut self.threads {
            thread.forget_images(&evicted);
        }
    }

    /// Hand queued frames to idle threads until one side runs out.
    fn drain(&mut self) {
        while let Some(slot) = self.threads.iter().position(RenderThread::is_ready) {
            let busy: HashSet<ClientId> = self
                .threads
                .iter()
                .filter_map(RenderThread::in_flight_client)
                .collect();
            let Some(idx) = self.pick_next(&busy) else {
                break;
            };
            let frame = self.backlog.remove(idx);
            self.dispatch(slot, frame);
        }
    }

    fn pick_next(&self, busy: &HashSet<ClientId>) -> Option<usize> {
        let ready = |f: &&Frame| !busy.contains(&f.client);
        match self.opts.dispatch_policy {
            DispatchPolicy::NewestFirst => self.backlog.iter().rposition(|f| ready(&f)),
            DispatchPolicy::RoundRobin => {
                let after = |f: &&Frame| self.last_served.is_none_or(|last| f.client > last);
                let pick = self
                    .backlog
                    .iter()
                    .filter(ready)
                    .filter(after)
                    .min_by_key(|f| f.client)
                    .or_else(|| self.backlog.iter().filter(ready).min_by_key(|f| f.client))?;
                self.backlog.iter().position(|f| f.client == pick.client)
            }
        }
    }

    fn dispatch(&mut self, slot: usize, frame: Frame) {
        let ticket = DispatchTicket(self.next_ticket);
        self.next_ticket += 1;
        let (client, seq, bytes) = (frame.client, frame.seq, frame.byte_len());
        self.last_served = Some(client);
        match self.threads[slot].run(frame, ticket) {
            Ok(images) => {
                self.stats.dispatched += 1;
                self.stats.images_sent += images as u64;
                tracing::debug!(slot, client = client.0, seq, bytes, images, "frame dispatched");
            }
            Err(e) => {
                tracing::warn!(slot, client = client.0, seq, error = %e, "dispatch failed");
                self.fault(slot, client);
            }
        }
    }

    fn fault(&mut self, slot: usize, client: ClientId) {
        self.stats.faulted += 1;
        if let Some(record) = self.clients.get_mut(&client) {
            record.locked = false;
        }
        match self.threads[slot].recycle(self.spawner.as_ref(), &self.reply_tx) {
            Ok(()) => self.stats.contexts_recycled += 1,
            Err(e) => tracing::warn!(slot, error = %e, "context could not be recreated"),
        }
        if self.clients.values().any(|c| !c.pending.is_empty()) {
            self.request_tick();
        }
    }

    /// Retry the spawn for slots left without a context by an earlier failed recycle.
    fn revive_slots(&mut self) {
        for slot in 0..self.threads.len() {
            let thread = &mut self.threads[slot];
            if thread.has_context() || !thread.is_idle() {
                continue;
            }
            match thread.recycle(self.spawner.as_ref(), &self.reply_tx) {
                Ok(()) => self.stats.contexts_recycled += 1,
                Err(e) => tracing::debug!(slot, error = %e, "context still unavailable"),
            }
        }
    }

    fn complete(&mut self, slot: usize, event: ThreadEvent) {
        match event {
            ThreadEvent::Painted {
                client,
                seq,
                bitmap,
                dirty,
            } => {
                self.stats.painted += 1;
                let Some(record) = self.clients.get_mut(&client) else {
                    tracing::debug!(client = client.0, seq, "painted frame for departed client");
                    return;
                };
                record.locked = false;
                (record.on_painted)(bitmap, &dirty);
                let retry = !record.pending.is_empty();
                tracing::debug!(slot, client = client.0, seq, "frame painted");
                if retry {
                    self.request_tick();
                }
            }
            ThreadEvent::Faulted {
                client,
                seq,
                reason,
            } => {
                tracing::warn!(slot, client = client.0, seq, %reason, "frame faulted");
                self.fault(slot, client);
            }
        }
    }

    fn handle_reply(&mut self, reply: ContextReply) -> bool {
        let slot = reply.slot;
        let Some(event) = self.threads.get_mut(slot).and_then(|t| t.resolve(reply)) else {
            return false;
        };
        self.complete(slot, event);
        true
    }

    fn check_timeouts(&mut self) -> usize {
        let now = Instant::now();
        let timeout = self.opts.thread_timeout();
        let mut expired = 0;
        for slot in 0..self.threads.len() {
            if let Some(event) = self.threads[slot].check_timeout(now, timeout) {
                expired += 1;
                self.complete(slot, event);
            }
        }
        expired
    }

    /// Resolve every reply already delivered, fault overdue frames and dispatch more work.
    /// Returns the number of frames resolved.
    pub fn poll(&mut self) -> usize {
        let mut resolved = 0;
        while let Ok(reply) = self.reply_rx.try_recv() {
            if self.handle_reply(reply) {
                resolved += 1;
            }
        }
        resolved += self.check_timeouts();
        self.revive_slots();
        self.drain();
        resolved
    }

    /// Block up to `timeout` for the next reply, then [`poll`](Self::poll).
    /// Returns at once when nothing is painting.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        let mut resolved = 0;
        if self.in_flight() > 0
            && let Ok(reply) = self.reply_rx.recv_timeout(timeout)
            && self.handle_reply(reply)
        {
            resolved += 1;
        }
        resolved + self.poll()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/scheduler.rs"]
mod tests;
