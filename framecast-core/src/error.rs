//! Domain-specific error types for the framecast engine.
//!
//! All fallible operations return `Result<T, CastError>`. The single
//! shared frame buffer depends on strict ordering, so nothing here is
//! retried: every transport-level failure collapses to full-stream
//! termination and teardown.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the streaming engine.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Setup Errors ─────────────────────────────────────────────
    /// Connection establishment, registration, or handshake failed.
    #[error("setup failure: {0}")]
    Setup(String),

    /// The peer's hello did not match what this side can serve.
    #[error("handshake mismatch: {0}")]
    HandshakeMismatch(&'static str),

    // ── Streaming Errors ─────────────────────────────────────────
    /// A send/write/receive could not be issued.
    #[error("transfer failure: {0}")]
    Transfer(String),

    /// A completion event reported an error status.
    #[error("completion error for sequence {sequence}: {reason}")]
    Completion { sequence: u64, reason: String },

    /// A peer violated the per-frame protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Wire Errors ──────────────────────────────────────────────
    /// Received bytes that do not start with the framecast magic.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// A numeric value did not map to any known wire frame kind.
    #[error("unknown frame kind: {0:#x}")]
    UnknownKind(u8),

    /// A wire frame exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Encoding or decoding of a handshake payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A transport channel was closed unexpectedly.
    #[error("transport channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Display Errors ───────────────────────────────────────────
    /// The display sink failed to initialise or present.
    #[error("display error: {0}")]
    Display(String),

    // ── Shutdown ─────────────────────────────────────────────────
    /// The streaming loop observed cancellation and unwound cleanly.
    #[error("streaming cancelled")]
    Cancelled,
}

impl CastError {
    /// Whether this error belongs to the setup taxonomy (distinct exit
    /// code from a mid-stream failure).
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup(_) | Self::HandshakeMismatch(_))
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for CastError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        CastError::Encoding(e.to_string())
    }
}
