//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing or parsing protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Fewer than 8 header bytes were available.
    #[error("short frame header: expected 8 bytes, got {received}")]
    ShortHeader { received: usize },

    /// The header declared a negative payload length.
    #[error("invalid frame length: {length}")]
    InvalidLength { length: i32 },

    /// Payload exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The buffer ended before the declared payload length.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// A JSON payload was expected but the frame was empty.
    #[error("empty payload")]
    EmptyPayload,

    /// JSON encode or decode failure.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true for errors caused by a single bad frame rather than a
    /// broken stream.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::EmptyPayload)
    }

    /// Returns true if the stream ended (cleanly or mid-frame).
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
