use crate::protocol::wire::DecodeError;

/// Result alias used across the crate.
pub type PaintResult<T> = Result<T, PaintError>;

/// Errors returned by construction-time and tooling APIs.
///
/// Runtime pipeline faults (bad segments, stalled contexts) are logged and counted instead of
/// being returned to drawing callers.
#[derive(thiserror::Error, Debug)]
pub enum PaintError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),

    #[error("context error: {0}")]
    Context(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PaintError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn context(msg: impl Into<String>) -> Self {
        Self::Context(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
