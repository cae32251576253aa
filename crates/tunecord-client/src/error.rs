//! Client error types.

use std::fmt;

use tunecord_ipc::IpcError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Session or discovery error.
    Ipc(IpcError),
    /// Operation timed out.
    Timeout(String),
    /// Logging setup failed.
    Tracing(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Ipc(err) => write!(f, "{}", err),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Tracing(msg) => write!(f, "logging setup failed: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Ipc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<IpcError> for ClientError {
    fn from(err: IpcError) -> Self {
        Self::Ipc(err)
    }
}

impl From<tunecord_core::TracingError> for ClientError {
    fn from(err: tunecord_core::TracingError) -> Self {
        Self::Tracing(err.to_string())
    }
}
