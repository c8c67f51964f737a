//! Replay side of the pipeline: raster surfaces and the segment executor.

/// Segment executor and context-local image table.
pub mod executor;
/// Reference surface that records the calls it receives.
pub mod recording;
/// Surface contract, bitmaps and image snapshots.
pub mod surface;
pub(crate) mod text;
/// Production CPU surface on `vello_cpu`.
pub mod vello;

pub use executor::Executor;
pub use recording::RecordingSurface;
pub use surface::{Bitmap, ImageTable, RasterSnapshot, RasterSurface};
pub use vello::VelloSurface;
