//! Line-delimited JSON feed of presence snapshots.
//!
//! A player integration writes one JSON object per line: a snapshot to
//! show, or `{"clear": true}` to remove the presence. Blank lines and
//! lines starting with `#` are skipped.

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use tunecord_core::PresenceUpdate;
use tunecord_ipc::Publisher;

/// One instruction from the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLine {
    Update(PresenceUpdate),
    Clear,
}

/// A line that could not be understood.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,
}

/// Counters reported when the feed ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub updates: usize,
    pub clears: usize,
    pub rejected: usize,
}

/// Parses one line. Returns `None` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<FeedLine>, FeedError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line)?;
    let Some(object) = value.as_object() else {
        return Err(FeedError::NotAnObject);
    };

    if object.get("clear").and_then(Value::as_bool) == Some(true) {
        return Ok(Some(FeedLine::Clear));
    }

    Ok(Some(FeedLine::Update(serde_json::from_value(value)?)))
}

/// Reads `reader` to the end, handing every line to `publisher`.
///
/// Malformed lines are logged and skipped.
pub async fn pump<R>(reader: R, publisher: &Publisher) -> std::io::Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Ok(Some(FeedLine::Update(update))) => {
                debug!(track = %update.identity(), position = update.position_seconds, "Snapshot received");
                publisher.submit(update);
                stats.updates += 1;
            }
            Ok(Some(FeedLine::Clear)) => {
                if let Err(e) = publisher.clear().await {
                    warn!(error = %e, "Failed to clear presence");
                }
                stats.clears += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Skipping malformed feed line");
                stats.rejected += 1;
            }
        }
    }

    Ok(stats)
}
