//! Presence session over the local IPC socket.
//!
//! This crate connects to the chat client's IPC endpoint and keeps a rich
//! presence activity up to date:
//! - Endpoint discovery in the per-user scratch directory
//! - Handshake, heartbeat and teardown of one session
//! - Change-detecting publishing of "now playing" snapshots
//! - A supervisor that retries failed connections
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunecord_core::PresenceUpdate;
//! use tunecord_ipc::{IpcConfig, Locator, Publisher, Session, Supervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = IpcConfig::new("123456789012345678");
//!     let session = Session::new(&config);
//!     let supervisor = Supervisor::new(
//!         session.clone(),
//!         Locator::from_config(&config),
//!         config.retry_delay,
//!     );
//!     let publisher = Arc::new(Publisher::new(session, config.presence.clone()));
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     tokio::spawn(supervisor.run());
//!     tokio::spawn(publisher.clone().run(shutdown_rx));
//!
//!     publisher.submit(PresenceUpdate::new("Song A", "Artist").with_duration(200.0));
//! }
//! ```

mod artwork;
mod config;
mod error;
mod publisher;
mod session;
mod supervisor;
mod transport;

#[cfg(test)]
mod testing;

#[cfg(feature = "itunes")]
pub use artwork::ItunesArtwork;
pub use artwork::{ArtworkResolver, BoxFuture, NoArtwork, StaticArtwork};
pub use config::{
    ButtonTemplate, DEFAULT_SANDBOX_MARKER, DEFAULT_SOCKET_PREFIX, IPC_DIR_ENV_VARS, IpcConfig,
    PresenceConfig, default_ipc_dir,
};
pub use error::{IpcError, IpcResult};
pub use publisher::{PublishOutcome, Publisher};
pub use session::{Session, SessionPhase};
pub use supervisor::{Supervisor, SupervisorCommand, SupervisorHandle, SupervisorState};
pub use transport::Locator;
