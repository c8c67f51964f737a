#![forbid(unsafe_code)]
//! Off-main-thread 2D drawing.
//!
//! Clients draw through a canvas-like [`Encoder`] that records calls into compact binary
//! segments. A host-driven [`Scheduler`] collects committed frames and replays them on a fixed
//! pool of isolated CPU raster contexts, handing each painted [`Bitmap`] back to its client.

pub mod encode;
pub mod foundation;
pub mod pool;
pub mod protocol;
pub mod render;
pub mod schedule;

pub use encode::{Encoder, EncoderOpts, Frame, ImageRegistry, SharedRegistry, SourceImage};
pub use foundation::config::PipelineOpts;
pub use foundation::core::{CallbackId, CanvasSize, ClientId, ImageId};
pub use foundation::error::{PaintError, PaintResult};
pub use pool::{ContextOpts, ContextSpawner, WorkerSpawner};
pub use protocol::{ColorValue, DecodeError, DrawCall, decode_segment};
pub use protocol::op::{
    CompositeOp, FillRule, LineCap, LineJoin, PatternRepeat, TextAlign, TextBaseline,
};
pub use render::{Bitmap, Executor, RasterSnapshot, RasterSurface, RecordingSurface, VelloSurface};
pub use schedule::{DispatchPolicy, FrameCtx, HostLoop, Raf, Scheduler, SchedulerStats};
