//! Pool side of the pipeline: isolated render contexts and the slots that own them.

/// Context worker protocol and the spawner seam.
pub mod context;
/// One pool slot: dispatch, already-sent bookkeeping and fault recovery.
pub mod thread;

pub use context::{
    ContextOpts, ContextReply, ContextRequest, ContextSpawner, RenderRequest, WorkerSpawner,
};
pub use thread::{DispatchTicket, RenderThread, ThreadEvent};
