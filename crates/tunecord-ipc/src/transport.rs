//! Endpoint discovery and connection.
//!
//! The peer listens on one or more Unix sockets named `<prefix><n>` in a
//! per-user scratch directory. The [`Locator`] lists those entries in
//! filesystem order and connects to the first one that accepts.

use std::path::{Path, PathBuf};

use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::config::IpcConfig;
use crate::error::{IpcError, IpcResult};

/// Finds and opens the peer's IPC socket.
#[derive(Debug, Clone)]
pub struct Locator {
    dir: PathBuf,
    prefix: String,
    /// Name of the sandbox marker variable, when it was found set.
    sandboxed_by: Option<String>,
}

impl Locator {
    /// Creates a locator scanning `dir` for entries starting with `prefix`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            sandboxed_by: None,
        }
    }

    /// Creates a locator from configuration and the process environment.
    pub fn from_config(config: &IpcConfig) -> Self {
        let sandboxed_by = std::env::var_os(&config.sandbox_marker)
            .is_some()
            .then(|| config.sandbox_marker.clone());

        Self {
            dir: config.resolved_ipc_dir(),
            prefix: config.socket_prefix.clone(),
            sandboxed_by,
        }
    }

    /// Builder: mark the locator as running under a sandbox.
    pub fn with_sandbox(mut self, marker: impl Into<String>) -> Self {
        self.sandboxed_by = Some(marker.into());
        self
    }

    /// Returns the scratch directory being scanned.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns true if discovery is blocked by a sandbox.
    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed_by.is_some()
    }

    /// Lists candidate sockets in enumeration order.
    ///
    /// A missing or unreadable directory yields no candidates.
    pub async fn candidates(&self) -> Vec<PathBuf> {
        let dir = match tokio::fs::canonicalize(&self.dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "IPC directory unavailable");
                return Vec::new();
            }
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list IPC directory");
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let matches = entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.starts_with(&self.prefix));
                    if matches {
                        candidates.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                }
            }
        }
        candidates
    }

    /// Connects to the first candidate that accepts.
    ///
    /// Returns the stream and the path it was opened on.
    pub async fn locate_and_connect(&self) -> IpcResult<(UnixStream, PathBuf)> {
        if let Some(ref marker) = self.sandboxed_by {
            return Err(IpcError::sandboxed(marker.clone()));
        }

        for candidate in self.candidates().await {
            match UnixStream::connect(&candidate).await {
                Ok(stream) => {
                    info!(path = %candidate.display(), "Connected to IPC endpoint");
                    return Ok((stream, candidate));
                }
                Err(e) => {
                    debug!(
                        path = %candidate.display(),
                        error = %e,
                        "IPC candidate refused connection"
                    );
                }
            }
        }

        Err(IpcError::no_endpoint(self.dir.to_string_lossy()))
    }
}
