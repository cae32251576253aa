//! IPC error types.

use std::io;
use std::time::Duration;
use thiserror::Error;

use tunecord_core::FailureReason;
use tunecord_protocol::ProtocolError;

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;

/// Errors that can occur while connecting to or talking with the peer.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The process is sandboxed and may not look for IPC endpoints.
    #[error("IPC discovery blocked by sandbox ({marker} is set)")]
    Sandboxed { marker: String },

    /// No candidate endpoint accepted a connection.
    #[error("no IPC endpoint found in {dir}")]
    NoEndpointFound { dir: String },

    /// IO error (connect, read, write).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing or JSON error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer stopped draining the socket.
    #[error("write to the peer did not complete within {0:?}")]
    WriteTimeout(Duration),

    /// The peer sent a close frame or ended the stream.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The session is not in the `Ready` phase.
    #[error("session is not ready")]
    NotReady,

    /// `attach` was called while a connection is still open.
    #[error("session already has an open connection")]
    AlreadyConnected,
}

impl IpcError {
    /// Creates a sandboxed error.
    pub fn sandboxed(marker: impl Into<String>) -> Self {
        Self::Sandboxed {
            marker: marker.into(),
        }
    }

    /// Creates a no-endpoint error.
    pub fn no_endpoint(dir: impl Into<String>) -> Self {
        Self::NoEndpointFound { dir: dir.into() }
    }

    /// Maps this error onto the status taxonomy shown to the UI.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::Sandboxed { .. } => FailureReason::Sandboxed,
            Self::NoEndpointFound { .. } => FailureReason::NoEndpointFound,
            Self::PeerClosed => FailureReason::PeerClosed,
            Self::Io(err) => io_failure(err),
            Self::Protocol(ProtocolError::Io(err)) => io_failure(err),
            Self::Protocol(_) => FailureReason::HandshakeFailed,
            Self::WriteTimeout(_) | Self::NotReady | Self::AlreadyConnected => {
                FailureReason::TransportError { code: None }
            }
        }
    }

    /// Returns true if the error came from the byte stream itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Protocol(ProtocolError::Io(_))
                | Self::WriteTimeout(_)
                | Self::PeerClosed
        )
    }
}

pub(crate) fn io_failure(err: &io::Error) -> FailureReason {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        FailureReason::PeerClosed
    } else {
        FailureReason::TransportError {
            code: err.raw_os_error(),
        }
    }
}
