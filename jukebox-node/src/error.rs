//! Error types for jukebox-node
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Store faults have their own [`StoreError`](crate::store::StoreError) and are
//! converted to boolean/`Option` results at the tracklist client boundary.

use jukebox_common::code::CodeError;
use jukebox_common::protocol::ProtocolError;
use thiserror::Error;

/// Main error type for jukebox-node
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Audio output errors (resource missing, empty or unreadable)
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Control-channel socket errors
    #[error("Control channel error: {0}")]
    Control(String),

    /// Malformed control-channel frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Malformed or out-of-range positional code
    #[error("Invalid song code: {0}")]
    Code(#[from] CodeError),

    /// Pub/sub socket or HTTP push errors
    #[error("Pub/sub error: {0}")]
    PubSub(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors surfaced by the shared crate (config, JSON frames)
    #[error(transparent)]
    Common(#[from] jukebox_common::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using jukebox-node Error
pub type Result<T> = std::result::Result<T, Error>;
