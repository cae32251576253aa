//! Externally observable connection state.

use std::fmt;

/// Why the presence session is not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The process runs inside a sandbox that forbids IPC discovery.
    Sandboxed,
    /// No IPC endpoint could be found or connected to.
    NoEndpointFound,
    /// A socket operation failed; carries the OS error code when known.
    TransportError { code: Option<i32> },
    /// The peer closed the connection (EOF or close frame).
    PeerClosed,
    /// The peer sent something unusable before the session became ready.
    HandshakeFailed,
}

impl FailureReason {
    /// Returns true if a later connection attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Sandboxed)
    }

    /// Returns a short machine-friendly name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandboxed => "sandboxed",
            Self::NoEndpointFound => "no_endpoint_found",
            Self::TransportError { .. } => "transport_error",
            Self::PeerClosed => "peer_closed",
            Self::HandshakeFailed => "handshake_failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandboxed => write!(f, "sandboxed, IPC unavailable"),
            Self::NoEndpointFound => write!(f, "no IPC endpoint found"),
            Self::TransportError { code: Some(code) } => write!(f, "transport error (os error {code})"),
            Self::TransportError { code: None } => write!(f, "transport error"),
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::HandshakeFailed => write!(f, "handshake failed"),
        }
    }
}

/// The single observable state of the presence session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Idle, nothing attempted or explicitly disconnected.
    #[default]
    Disconnected,
    /// A connection attempt is in flight or scheduled.
    Connecting,
    /// Handshake completed, presence can be published.
    Connected,
    /// The last attempt or the live session failed.
    Failed(FailureReason),
}

impl SessionStatus {
    /// Returns true when the session is ready.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns the failure reason, if any.
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            Self::Failed(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns true if the session can never connect in this process.
    pub fn is_unrecoverable(&self) -> bool {
        self.failure().is_some_and(|reason| !reason.is_retryable())
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sandboxed_is_permanent() {
        assert!(!FailureReason::Sandboxed.is_retryable());
        assert!(FailureReason::NoEndpointFound.is_retryable());
        assert!(FailureReason::PeerClosed.is_retryable());
        assert!(FailureReason::HandshakeFailed.is_retryable());
        assert!(FailureReason::TransportError { code: Some(32) }.is_retryable());
    }

    #[test]
    fn status_helpers() {
        assert_eq!(SessionStatus::default(), SessionStatus::Disconnected);
        assert!(SessionStatus::Connected.is_connected());
        assert!(SessionStatus::Failed(FailureReason::Sandboxed).is_unrecoverable());
        assert!(!SessionStatus::Failed(FailureReason::PeerClosed).is_unrecoverable());
        assert_eq!(
            SessionStatus::Failed(FailureReason::PeerClosed).failure(),
            Some(FailureReason::PeerClosed)
        );
    }

    #[test]
    fn display_includes_os_code() {
        let status = SessionStatus::Failed(FailureReason::TransportError { code: Some(32) });
        assert_eq!(status.to_string(), "failed: transport error (os error 32)");
    }
}
