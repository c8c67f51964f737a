//! Shared identifiers, errors and configuration used by every pipeline stage.

/// Identifier newtypes and geometry re-exports.
pub mod core;
/// Crate error type.
pub mod error;
/// Pipeline configuration and its environment overrides.
pub mod config;
