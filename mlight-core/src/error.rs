//! Domain-specific error types for the mlight protocol and decoder.
//!
//! All fallible operations return `Result<T, MlightError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

use crate::message::SweepAxis;

/// The canonical error type for the mlight suite.
#[derive(Debug, Error)]
pub enum MlightError {
    // ── Codec Errors ─────────────────────────────────────────────
    /// The received frame could not be parsed as a protocol message.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The envelope version byte is not one this build understands.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    // ── Message Validation ───────────────────────────────────────
    /// Exposure bracket durations and ISOs differ in length.
    #[error("bracket mismatch: {durations} durations vs {isos} ISOs")]
    BracketMismatch { durations: usize, isos: usize },

    /// A peer sent a reply that is not valid at the current point of
    /// the capture sequence.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(&'static str),

    // ── Decoder Errors ───────────────────────────────────────────
    /// Min-stripe-width decoding requested but no conversion table
    /// has been loaded.
    #[error("min-stripe-width code table not loaded")]
    DecodeTableMissing,

    /// A threshold image does not match the decoder's pixel arrays.
    #[error("dimension mismatch: decoder is {expected_w}x{expected_h}, image is {actual_w}x{actual_h}")]
    DimensionMismatch {
        expected_w: usize,
        expected_h: usize,
        actual_w: usize,
        actual_h: usize,
    },

    /// A bit-plane index outside the supported code width.
    #[error("bit index {bit} out of range (max {max})")]
    BitOutOfRange { bit: u32, max: u32 },

    // ── Sweep Errors ─────────────────────────────────────────────
    /// A sweep was requested while the transport was not ready.
    #[error("transport session not ready")]
    NotReady,

    /// The remote peer signalled a capture failure mid-sweep.
    ///
    /// Identifies the failing (projector, position, axis, bit) so the
    /// operator knows exactly which take to redo. No partial raster is
    /// ever written for an aborted sweep.
    #[error("sweep aborted at proj {projector} pos {position} axis {axis} bit {bit}: {reason}")]
    SweepAborted {
        projector: u32,
        position: u32,
        axis: SweepAxis,
        bit: u32,
        reason: String,
    },

    /// The sweep was cancelled between bit transitions.
    #[error("sweep cancelled")]
    Cancelled,

    // ── Connection Errors ────────────────────────────────────────
    /// The peer connection was lost. Terminal for the session;
    /// reconnection is a coordinator policy decision.
    #[error("link lost")]
    LinkLost,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Application Errors ───────────────────────────────────────
    /// A command prompt line could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MlightError {
    fn from(s: String) -> Self {
        MlightError::Other(s)
    }
}

impl From<&str> for MlightError {
    fn from(s: &str) -> Self {
        MlightError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MlightError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MlightError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for MlightError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        MlightError::Encoding(e.to_string())
    }
}

impl From<serde_yaml::Error> for MlightError {
    fn from(e: serde_yaml::Error) -> Self {
        MlightError::Encoding(e.to_string())
    }
}
