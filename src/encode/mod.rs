//! Recording side of the pipeline.
//!
//! Clients draw into an [`encoder::Encoder`], which writes every call straight into binary
//! segments and commits them as [`encoder::Frame`]s. Source images are deduplicated through the
//! scheduler-wide [`registry::ImageRegistry`].

/// Drawing-surface encoder and committed frames.
pub mod encoder;
/// Identity-keyed image registry.
pub mod registry;

pub use encoder::{Encoder, EncoderOpts, Frame};
pub use registry::{ImageRegistry, SharedRegistry, SourceImage};
