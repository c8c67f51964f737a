use crate::schedule::scheduler::Scheduler;
use std::time::{Duration, Instant};

/// Drives a [`Scheduler`] the way a display loop would: a host tick at most once per interval,
/// and only when one was requested. Between ticks it waits on context replies.
#[derive(Debug)]
pub struct HostLoop {
    interval: Duration,
    started: Instant,
    ticks: u64,
}

impl HostLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
            ticks: 0,
        }
    }

    /// Loop paced at `fps` ticks per second. Zero is treated as one.
    pub fn at_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }

    /// Milliseconds since the loop was created; the timestamp handed to callbacks.
    pub fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until `done` holds or `budget` has elapsed. Returns `true` when `done` held.
    pub fn run_until(
        &mut self,
        sched: &mut Scheduler,
        budget: Duration,
        mut done: impl FnMut(&Scheduler) -> bool,
    ) -> bool {
        let deadline = Instant::now() + budget;
        let mut next_tick = Instant::now();
        loop {
            if done(sched) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(ticks = self.ticks, "host loop budget exhausted");
                return false;
            }
            if now >= next_tick {
                if sched.tick_requested() {
                    sched.on_host_tick(self.now_ms());
                    self.ticks += 1;
                }
                next_tick = now + self.interval;
            }
            let pause = next_tick
                .min(deadline)
                .saturating_duration_since(Instant::now());
            if sched.in_flight() > 0 {
                sched.wait(pause);
            } else {
                sched.poll();
                std::thread::sleep(pause);
            }
        }
    }

    /// Run until the scheduler has nothing left to do.
    pub fn run_to_idle(&mut self, sched: &mut Scheduler, budget: Duration) -> bool {
        self.run_until(sched, budget, Scheduler::is_settled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/host.rs"]
mod tests;
