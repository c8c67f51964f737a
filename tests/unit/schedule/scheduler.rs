use super::*;
use crate::encode::registry::SourceImage;
use crate::foundation::core::{CanvasSize, ImageId};
use crate::pool::context::{ContextRequest, RenderRequest};
use crate::protocol::call::{DrawCall, decode_segment};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc::channel;

struct Link {
    slot: usize,
    generation: u64,
    requests: Receiver<ContextRequest>,
    replies: Sender<ContextReply>,
}

/// Contexts that never run anything; tests answer for them.
#[derive(Clone, Default)]
struct ManualSpawner {
    links: Rc<RefCell<Vec<Link>>>,
    refuse: Rc<Cell<bool>>,
}

impl ContextSpawner for ManualSpawner {
    fn spawn(
        &self,
        slot: usize,
        generation: u64,
        replies: Sender<ContextReply>,
    ) -> PaintResult<Sender<ContextRequest>> {
        if self.refuse.get() {
            return Err(PaintError::context("spawn refused"));
        }
        let (tx, rx) = channel();
        self.links.borrow_mut().push(Link {
            slot,
            generation,
            requests: rx,
            replies,
        });
        Ok(tx)
    }
}

impl ManualSpawner {
    fn spawned(&self) -> usize {
        self.links.borrow().len()
    }

    /// Take the render pending on `slot`'s newest context without answering it.
    fn take(&self, slot: usize) -> (u64, RenderRequest) {
        let links = self.links.borrow();
        let link = links.iter().rev().find(|l| l.slot == slot).unwrap();
        loop {
            match link.requests.try_recv().unwrap() {
                ContextRequest::Render(r) => return (link.generation, r),
                _ => continue,
            }
        }
    }

    fn answer(&self, slot: usize, generation: u64, ticket: DispatchTicket) {
        let links = self.links.borrow();
        links[0]
            .replies
            .send(ContextReply {
                slot,
                generation,
                ticket,
                outcome: Ok(Bitmap::transparent(CanvasSize::new(4, 4))),
            })
            .unwrap();
    }

    /// Answer the render pending on `slot` and return it.
    fn finish(&self, slot: usize) -> RenderRequest {
        let (generation, req) = self.take(slot);
        self.answer(slot, generation, req.ticket);
        req
    }
}

fn scheduler(opts: PipelineOpts) -> (Scheduler, ManualSpawner) {
    let spawner = ManualSpawner::default();
    let sched = Scheduler::with_spawner(opts, Box::new(spawner.clone())).unwrap();
    (sched, spawner)
}

fn threads(n: usize) -> PipelineOpts {
    PipelineOpts {
        threads: n,
        ..PipelineOpts::default()
    }
}

fn draw_frame(ctx: &mut FrameCtx<'_>) {
    ctx.encoder.start(4, 4);
    ctx.encoder.fill_rect(0.0, 0.0, 2.0, 2.0);
    ctx.encoder.commit();
}

fn ignore_paint(_: Bitmap, _: &[Rect]) {}

fn counting(count: &Rc<Cell<u32>>) -> impl FnMut(Bitmap, &[Rect]) + 'static {
    let count = count.clone();
    move |_, _| count.set(count.get() + 1)
}

fn busy_clients(sched: &Scheduler) -> Vec<Option<u32>> {
    sched
        .threads
        .iter()
        .map(|t| t.in_flight_client().map(|c| c.0))
        .collect()
}

#[test]
fn callbacks_fire_in_order_and_lock_until_painted() {
    let (mut sched, spawner) = scheduler(threads(2));
    let painted = Rc::new(Cell::new(0));
    let raf = sched.get_raf(counting(&painted));
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    sched
        .request_next_frame(raf, move |_| l.borrow_mut().push("first"))
        .unwrap();
    let l = log.clone();
    sched
        .request_next_frame(raf, move |ctx| {
            l.borrow_mut().push("second");
            draw_frame(ctx);
        })
        .unwrap();
    sched.on_host_tick(16.0);
    assert_eq!(*log.borrow(), vec!["first", "second"]);
    assert_eq!(sched.stats().dispatched, 1);

    let l = log.clone();
    sched
        .request_next_frame(raf, move |ctx| {
            l.borrow_mut().push("third");
            draw_frame(ctx);
        })
        .unwrap();
    sched.on_host_tick(32.0);
    sched.on_host_tick(48.0);
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(sched.stats().dispatched, 1);
    assert!(sched.tick_requested());

    spawner.finish(0);
    assert_eq!(sched.poll(), 1);
    assert_eq!(painted.get(), 1);

    sched.on_host_tick(64.0);
    assert_eq!(log.borrow().last(), Some(&"third"));
    assert_eq!(sched.stats().dispatched, 2);
}

#[test]
fn callbacks_without_commit_do_not_lock() {
    let (mut sched, _spawner) = scheduler(threads(1));
    let raf = sched.get_raf(ignore_paint);
    let fired = Rc::new(Cell::new(0));
    for tick in 0..3 {
        let f = fired.clone();
        sched
            .request_next_frame(raf, move |_| f.set(f.get() + 1))
            .unwrap();
        sched.on_host_tick(f64::from(tick) * 16.0);
    }
    assert_eq!(fired.get(), 3);
    assert_eq!(sched.stats().committed, 0);
}

#[test]
fn saturated_pool_serves_newest_first() {
    let (mut sched, spawner) = scheduler(threads(3));
    let rafs: Vec<Raf> = (0..5).map(|_| sched.get_raf(ignore_paint)).collect();
    for raf in &rafs {
        sched.request_next_frame(*raf, draw_frame).unwrap();
    }
    sched.on_host_tick(0.0);

    assert_eq!(sched.stats().dispatched, 3);
    assert_eq!(sched.queued(), 2);
    assert_eq!(busy_clients(&sched), vec![Some(4), Some(3), Some(2)]);

    spawner.finish(1);
    sched.poll();
    assert_eq!(busy_clients(&sched), vec![Some(4), Some(1), Some(2)]);
    spawner.finish(0);
    sched.poll();
    assert_eq!(busy_clients(&sched), vec![Some(0), Some(1), Some(2)]);
    assert_eq!(sched.queued(), 0);
}

#[test]
fn round_robin_rotates_over_clients() {
    let opts = PipelineOpts {
        threads: 1,
        dispatch_policy: DispatchPolicy::RoundRobin,
        ..PipelineOpts::default()
    };
    let (mut sched, spawner) = scheduler(opts);
    let rafs: Vec<Raf> = (0..3).map(|_| sched.get_raf(ignore_paint)).collect();
    for raf in &rafs {
        sched.request_next_frame(*raf, draw_frame).unwrap();
    }
    sched.on_host_tick(0.0);

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(busy_clients(&sched)[0]);
        spawner.finish(0);
        sched.poll();
    }
    assert_eq!(order, vec![Some(0), Some(1), Some(2)]);

    // Client 2 was served last, so client 0 comes before client 1 again.
    sched.request_next_frame(rafs[1], draw_frame).unwrap();
    sched.request_next_frame(rafs[0], draw_frame).unwrap();
    sched.request_next_frame(rafs[2], draw_frame).unwrap();
    sched.on_host_tick(16.0);
    assert_eq!(busy_clients(&sched), vec![Some(0)]);
}

#[test]
fn newer_commit_supersedes_queued_frame() {
    let (mut sched, spawner) = scheduler(threads(1));
    let blocker = sched.get_raf(ignore_paint);
    let raf = sched.get_raf(ignore_paint);

    sched.request_next_frame(blocker, draw_frame).unwrap();
    sched.on_host_tick(0.0);
    sched.request_next_frame(raf, draw_frame).unwrap();
    sched.on_host_tick(16.0);
    assert_eq!(sched.queued(), 1);

    let enc = sched.encoder(raf).unwrap();
    enc.start(4, 4);
    enc.fill_rect(9.0, 9.0, 1.0, 1.0);
    assert!(enc.commit());
    sched.on_host_tick(32.0);
    assert_eq!(sched.queued(), 1);
    assert_eq!(sched.stats().superseded, 1);

    spawner.finish(0);
    sched.poll();
    let (_, req) = spawner.take(0);
    let (calls, err) = decode_segment(&req.buffers[0]);
    assert_eq!(err, None);
    assert!(calls.contains(&DrawCall::FillRect {
        x: 9.0,
        y: 9.0,
        w: 1.0,
        h: 1.0
    }));
}

#[test]
fn unregister_with_frame_in_flight_is_safe() {
    let (mut sched, spawner) = scheduler(threads(1));
    let painted = Rc::new(Cell::new(0));
    let queued = sched.get_raf(ignore_paint);
    let gone = sched.get_raf(counting(&painted));
    sched.request_next_frame(queued, draw_frame).unwrap();
    sched.request_next_frame(gone, draw_frame).unwrap();
    sched.on_host_tick(0.0);
    assert_eq!(busy_clients(&sched), vec![Some(gone.client().0)]);

    assert!(sched.unregister(queued));
    assert_eq!(sched.queued(), 0);
    assert!(sched.unregister(gone));
    assert!(!sched.unregister(gone));
    assert!(sched.request_next_frame(gone, draw_frame).is_err());
    assert!(sched.encoder(gone).is_none());

    spawner.finish(0);
    assert_eq!(sched.poll(), 1);
    assert_eq!(painted.get(), 0);
    assert_eq!(sched.stats().painted, 1);
    assert!(sched.is_settled());
}

#[test]
fn one_tick_request_for_many_clients() {
    let (mut sched, _spawner) = scheduler(threads(1));
    let hook_calls = Rc::new(Cell::new(0));
    let h = hook_calls.clone();
    sched.set_host_hook(move || h.set(h.get() + 1));

    let a = sched.get_raf(ignore_paint);
    let b = sched.get_raf(ignore_paint);
    sched.request_next_frame(a, |_| {}).unwrap();
    sched.request_next_frame(b, |_| {}).unwrap();
    sched.request_next_frame(a, |_| {}).unwrap();
    assert!(sched.tick_requested());
    assert_eq!(hook_calls.get(), 1);

    sched.on_host_tick(0.0);
    assert!(!sched.tick_requested());

    sched
        .request_next_frame(a, |ctx| {
            ctx.request_next_frame(|_| {});
        })
        .unwrap();
    assert_eq!(hook_calls.get(), 2);
    sched.on_host_tick(16.0);
    assert!(sched.tick_requested());
    assert_eq!(hook_calls.get(), 3);
}

#[test]
fn frame_ctx_reports_timing() {
    let (mut sched, _spawner) = scheduler(threads(1));
    let raf = sched.get_raf(ignore_paint);
    let seen = Rc::new(RefCell::new(Vec::new()));
    for now in [100.0, 116.0] {
        let s = seen.clone();
        sched
            .request_next_frame(raf, move |ctx| {
                s.borrow_mut().push((ctx.frame, ctx.now_ms, ctx.delta_ms))
            })
            .unwrap();
        sched.on_host_tick(now);
    }
    assert_eq!(*seen.borrow(), vec![(0, 100.0, 0.0), (1, 116.0, 16.0)]);
}

#[test]
fn cancelled_callback_never_fires() {
    let (mut sched, _spawner) = scheduler(threads(1));
    let raf = sched.get_raf(ignore_paint);
    let fired = Rc::new(Cell::new(false));
    let f = fired.clone();
    let id = sched.request_next_frame(raf, move |_| f.set(true)).unwrap();
    assert!(sched.cancel(raf, id));
    assert!(!sched.cancel(raf, id));
    sched.on_host_tick(0.0);
    assert!(!fired.get());
}

#[test]
fn overdue_context_is_recycled_and_client_unlocked() {
    let opts = PipelineOpts {
        threads: 1,
        thread_timeout_ms: 1,
        ..PipelineOpts::default()
    };
    let (mut sched, spawner) = scheduler(opts);
    let painted = Rc::new(Cell::new(0));
    let raf = sched.get_raf(counting(&painted));
    sched.request_next_frame(raf, draw_frame).unwrap();
    sched.on_host_tick(0.0);
    let (generation, stuck) = spawner.take(0);

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sched.poll(), 1);
    let stats = sched.stats();
    assert_eq!((stats.faulted, stats.contexts_recycled), (1, 1));
    assert_eq!(spawner.spawned(), 2);
    assert_eq!(painted.get(), 0);

    // The abandoned context answering late is ignored.
    spawner.answer(0, generation, stuck.ticket);
    assert_eq!(sched.poll(), 0);

    sched.request_next_frame(raf, draw_frame).unwrap();
    sched.on_host_tick(16.0);
    assert_eq!(sched.stats().dispatched, 2);
}

#[test]
fn slot_without_context_is_skipped_and_revived() {
    let opts = PipelineOpts {
        threads: 2,
        thread_timeout_ms: 1,
        ..PipelineOpts::default()
    };
    let (mut sched, spawner) = scheduler(opts);
    let painted = Rc::new(Cell::new(0));
    let stuck = sched.get_raf(counting(&painted));
    sched.request_next_frame(stuck, draw_frame).unwrap();
    sched.on_host_tick(0.0);
    assert_eq!(busy_clients(&sched), vec![Some(0), None]);
    spawner.take(0);

    spawner.refuse.set(true);
    std::thread::sleep(Duration::from_millis(20));
    sched.poll();
    assert!(!sched.threads[0].has_context());
    assert_eq!(sched.stats().contexts_recycled, 0);

    let rafs: Vec<Raf> = (0..3).map(|_| sched.get_raf(counting(&painted))).collect();
    for raf in &rafs {
        sched.request_next_frame(*raf, draw_frame).unwrap();
    }
    sched.on_host_tick(16.0);
    // Only the live slot takes work; the rest waits in the backlog.
    assert_eq!(busy_clients(&sched), vec![None, Some(3)]);
    assert_eq!(sched.queued(), 2);
    assert_eq!(sched.stats().faulted, 1);

    spawner.finish(1);
    sched.poll();
    assert_eq!(painted.get(), 1);
    assert_eq!(busy_clients(&sched), vec![None, Some(2)]);

    spawner.refuse.set(false);
    spawner.finish(1);
    sched.poll();
    assert!(sched.threads[0].has_context());
    assert_eq!(sched.stats().contexts_recycled, 1);
    assert_eq!(busy_clients(&sched), vec![Some(1), None]);
    spawner.finish(0);
    sched.poll();

    assert_eq!(painted.get(), 3);
    let stats = sched.stats();
    assert_eq!((stats.committed, stats.dispatched, stats.faulted), (4, 4, 1));
    assert!(sched.is_settled());
}

#[test]
fn thread_receives_each_image_once() {
    let (mut sched, spawner) = scheduler(threads(1));
    let raf = sched.get_raf(ignore_paint);
    let img = SourceImage::from_rgba8(1, 1, vec![9, 9, 9, 255]).unwrap();
    for tick in 0..2 {
        let img = img.clone();
        sched
            .request_next_frame(raf, move |ctx| {
                ctx.encoder.start(4, 4);
                ctx.encoder.draw_image(&img, 0.0, 0.0);
                ctx.encoder.draw_image(&img, 2.0, 2.0);
                ctx.encoder.commit();
            })
            .unwrap();
        sched.on_host_tick(f64::from(tick) * 16.0);
        let req = spawner.finish(0);
        assert_eq!(req.image_ids.len(), if tick == 0 { 1 } else { 0 });
        sched.poll();
    }
    assert_eq!(sched.registry().borrow().len(), 1);
    assert_eq!(sched.stats().images_sent, 1);
}

#[test]
fn idle_images_are_forgotten_by_threads() {
    let opts = PipelineOpts {
        threads: 1,
        image_idle_commits: Some(1),
        ..PipelineOpts::default()
    };
    let (mut sched, spawner) = scheduler(opts);
    let raf = sched.get_raf(ignore_paint);
    let img = SourceImage::from_rgba8(1, 1, vec![9, 9, 9, 255]).unwrap();
    sched
        .request_next_frame(raf, move |ctx| {
            ctx.encoder.start(4, 4);
            ctx.encoder.draw_image(&img, 0.0, 0.0);
            ctx.encoder.commit();
        })
        .unwrap();
    sched.on_host_tick(0.0);
    spawner.finish(0);
    sched.poll();
    assert!(sched.threads[0].has_sent(ImageId(1)));

    for tick in 1..4 {
        sched.request_next_frame(raf, draw_frame).unwrap();
        sched.on_host_tick(f64::from(tick) * 16.0);
        spawner.finish(0);
        sched.poll();
    }
    assert!(sched.registry().borrow().is_empty());
    assert!(!sched.threads[0].has_sent(ImageId(1)));
}

#[test]
fn zero_threads_is_rejected() {
    let spawner = ManualSpawner::default();
    assert!(Scheduler::with_spawner(threads(0), Box::new(spawner)).is_err());
}
