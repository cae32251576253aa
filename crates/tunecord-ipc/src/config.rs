//! IPC session configuration.

use std::path::PathBuf;
use std::time::Duration;

use tunecord_core::PresenceUpdate;
use tunecord_protocol::ActivityType;

/// File-name prefix of the peer's IPC sockets.
pub const DEFAULT_SOCKET_PREFIX: &str = "discord-ipc-";

/// Environment variable set by the macOS App Sandbox.
pub const DEFAULT_SANDBOX_MARKER: &str = "APP_SANDBOX_CONTAINER_ID";

/// Environment variables consulted, in order, for the scratch directory.
pub const IPC_DIR_ENV_VARS: [&str; 4] = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"];

/// Session, discovery and reconnection settings.
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Application id sent in the handshake.
    pub client_id: String,

    /// Scratch directory override. `None` uses [`default_ipc_dir`].
    pub ipc_dir: Option<PathBuf>,

    /// File-name prefix of candidate sockets.
    pub socket_prefix: String,

    /// Environment variable whose presence means "sandboxed".
    pub sandbox_marker: String,

    /// Interval between heartbeats once ready.
    pub heartbeat_interval: Duration,

    /// Delay before a failed connection is retried.
    pub retry_delay: Duration,

    /// How long the peer has to answer the handshake with `READY`.
    pub ready_timeout: Duration,

    /// How long a single frame write may wait for the peer to drain the
    /// socket.
    pub write_timeout: Duration,

    /// Presence publishing settings.
    pub presence: PresenceConfig,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            ipc_dir: None,
            socket_prefix: DEFAULT_SOCKET_PREFIX.to_string(),
            sandbox_marker: DEFAULT_SANDBOX_MARKER.to_string(),
            heartbeat_interval: Duration::from_secs(15),
            retry_delay: Duration::from_secs(15),
            ready_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            presence: PresenceConfig::default(),
        }
    }
}

impl IpcConfig {
    /// Creates a configuration for the given application id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    /// Builder: set scratch directory override.
    pub fn with_ipc_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ipc_dir = Some(dir.into());
        self
    }

    /// Builder: set socket prefix.
    pub fn with_socket_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.socket_prefix = prefix.into();
        self
    }

    /// Builder: set sandbox marker variable.
    pub fn with_sandbox_marker(mut self, marker: impl Into<String>) -> Self {
        self.sandbox_marker = marker.into();
        self
    }

    /// Builder: set heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Builder: set retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Builder: set the `READY` deadline.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Builder: set the per-frame write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Builder: set presence settings.
    pub fn with_presence(mut self, presence: PresenceConfig) -> Self {
        self.presence = presence;
        self
    }

    /// Returns the scratch directory to scan.
    pub fn resolved_ipc_dir(&self) -> PathBuf {
        self.ipc_dir.clone().unwrap_or_else(default_ipc_dir)
    }
}

/// Presence publishing settings.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// How often the latest snapshot is compared with the last one sent.
    pub publish_interval: Duration,

    /// Start-timestamp drift beyond which a seek is assumed.
    pub scrub_tolerance: Duration,

    /// Activity type shown by the peer.
    pub activity_type: ActivityType,

    /// Large image used when no artwork resolves.
    pub fallback_large_image: Option<String>,

    /// Small image key or URL (usually the player logo).
    pub small_image: Option<String>,

    /// Hover text of the small image.
    pub small_text: Option<String>,

    /// Link buttons, at most two are sent.
    pub buttons: Vec<ButtonTemplate>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            publish_interval: Duration::from_millis(500),
            scrub_tolerance: Duration::from_secs(3),
            activity_type: ActivityType::Listening,
            fallback_large_image: None,
            small_image: None,
            small_text: None,
            buttons: Vec::new(),
        }
    }
}

impl PresenceConfig {
    /// Builder: set publish interval.
    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    /// Builder: set scrub tolerance.
    pub fn with_scrub_tolerance(mut self, tolerance: Duration) -> Self {
        self.scrub_tolerance = tolerance;
        self
    }

    /// Builder: set activity type.
    pub fn with_activity_type(mut self, kind: ActivityType) -> Self {
        self.activity_type = kind;
        self
    }

    /// Builder: add a button.
    pub fn with_button(mut self, button: ButtonTemplate) -> Self {
        self.buttons.push(button);
        self
    }
}

/// A button whose URL may reference the current track.
///
/// `{title}`, `{artist}` and `{album}` in the URL are replaced with the
/// percent-encoded values of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonTemplate {
    pub label: String,
    pub url: String,
}

impl ButtonTemplate {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }

    /// Expands the URL for `update`. Returns `None` unless the result is
    /// an absolute http(s) URL.
    pub fn render(&self, update: &PresenceUpdate) -> Option<String> {
        let album = update.album.as_deref().unwrap_or_default();
        let expanded = self
            .url
            .replace("{title}", &urlencoding::encode(&update.title))
            .replace("{artist}", &urlencoding::encode(&update.artist))
            .replace("{album}", &urlencoding::encode(album));

        let parsed = url::Url::parse(&expanded).ok()?;
        matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
    }
}

/// Returns the default scratch directory.
///
/// Uses the first non-empty of `$XDG_RUNTIME_DIR`, `$TMPDIR`, `$TMP` and
/// `$TEMP`, otherwise `/tmp`.
pub fn default_ipc_dir() -> PathBuf {
    IPC_DIR_ENV_VARS
        .iter()
        .filter_map(std::env::var_os)
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = IpcConfig::default();
        assert_eq!(config.socket_prefix, "discord-ipc-");
        assert_eq!(config.sandbox_marker, "APP_SANDBOX_CONTAINER_ID");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.retry_delay, Duration::from_secs(15));
        assert_eq!(config.ready_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.presence.publish_interval, Duration::from_millis(500));
        assert_eq!(config.presence.scrub_tolerance, Duration::from_secs(3));
        assert_eq!(config.presence.activity_type, ActivityType::Listening);
    }

    #[test]
    fn custom_config() {
        let config = IpcConfig::new("123")
            .with_ipc_dir("/run/user/1000")
            .with_socket_prefix("test-ipc-")
            .with_retry_delay(Duration::from_secs(1))
            .with_heartbeat_interval(Duration::from_secs(2))
            .with_ready_timeout(Duration::from_secs(3))
            .with_write_timeout(Duration::from_millis(250));

        assert_eq!(config.client_id, "123");
        assert_eq!(config.resolved_ipc_dir(), PathBuf::from("/run/user/1000"));
        assert_eq!(config.socket_prefix, "test-ipc-");
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.ready_timeout, Duration::from_secs(3));
        assert_eq!(config.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn default_ipc_dir_is_absolute() {
        assert!(default_ipc_dir().is_absolute());
    }

    #[test]
    fn button_template_encodes_track_fields() {
        let button = ButtonTemplate::new("Search", "https://music.example/search?q={artist}%20{title}");
        let update = PresenceUpdate::new("Hey Jude", "The Beatles");

        assert_eq!(
            button.render(&update).unwrap(),
            "https://music.example/search?q=The%20Beatles%20Hey%20Jude"
        );
    }

    #[test]
    fn button_template_rejects_non_http() {
        let update = PresenceUpdate::new("Song", "Artist");
        assert!(ButtonTemplate::new("x", "file:///{title}").render(&update).is_none());
        assert!(ButtonTemplate::new("x", "not a url").render(&update).is_none());
    }
}
