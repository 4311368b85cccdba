//! Public error surface of the crate.

use thiserror::Error;

/// Construction-time configuration errors. Fatal to construction; nothing is
/// allocated before these are rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The multiply factor must be a finite number (no NaN / infinity).
    #[error("multiply factor must be a finite number, got {0}")]
    InvalidFactor(f64),
    /// An OS thread for the engine or driver could not be started.
    #[error("failed to start worker thread: {0}")]
    Thread(String),
}

/// Errors surfaced through write acknowledgments and handle operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// The stream was torn down while this write was still pending.
    #[error("stream torn down before the chunk was processed")]
    Cancelled,
    /// The stream's driver thread has already exited.
    #[error("stream is closed")]
    Closed,
    /// A runtime reconfiguration carried an invalid value.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Internal-consistency violations of the feed/completion protocol.
///
/// These indicate a broken engine pairing, not recoverable user error; the
/// driver stops the stream when one occurs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("engine completion arrived while the chunk queue was empty")]
    UnexpectedCompletion,
    #[error("engine completion out of order: expected seq {expected}, got {got}")]
    CompletionOutOfOrder { expected: u64, got: u64 },
    #[error("downstream receiver disconnected")]
    DownstreamClosed,
}
