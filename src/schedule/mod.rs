//! Host-tick multiplexing and frame dispatch.

/// Fixed-interval driver standing in for the host's animation loop.
pub mod host;
/// Client registry, tick algorithm and dispatch policy.
pub mod scheduler;

pub use host::HostLoop;
pub use scheduler::{
    DispatchPolicy, FrameCallback, FrameCtx, PaintedFn, Raf, Scheduler, SchedulerStats,
};
