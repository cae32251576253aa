//! Core types: presence snapshots, session status, tracing setup

pub mod presence;
pub mod status;
pub mod tracing;

pub use presence::{MAX_TRACK_SECONDS, PresenceUpdate, TrackIdentity};
pub use status::{FailureReason, SessionStatus};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
