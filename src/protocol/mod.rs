//! Binary command-buffer protocol shared by the encoder and the decoder.
//!
//! A segment is a flat little-endian byte run of actions. Each action is one opcode byte followed
//! by the operand layout of that opcode. Byte `0` is the end-of-segment sentinel and is never
//! written as a live action.

/// Decoded action values, their byte layouts and the segment decoder.
pub mod call;
/// Paint values (solid colors, gradients, patterns) and their wire layout.
pub mod color;
/// Opcode and operand enumerations.
pub mod op;
/// Primitive little-endian writer/reader and decode errors.
pub mod wire;

pub use call::{DrawCall, decode_segment};
pub use color::{ColorStop, ColorValue, PatternSpec};
pub use op::{
    CompositeOp, FillRule, LineCap, LineJoin, Op, PatternRepeat, TextAlign, TextBaseline,
};
pub use wire::DecodeError;
