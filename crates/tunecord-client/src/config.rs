//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/tunecord/config.toml` by default:
//!
//! ```toml
//! [discord]
//! client_id = "123456789012345678"
//!
//! [presence]
//! activity_type = "listening"
//! artwork = "itunes"
//! small_image = "player-logo"
//!
//! [[presence.buttons]]
//! label = "Search"
//! url = "https://music.example/search?q={artist}%20{title}"
//!
//! [timing]
//! retry_secs = 15
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tunecord_ipc::{
    ButtonTemplate, DEFAULT_SANDBOX_MARKER, DEFAULT_SOCKET_PREFIX, IpcConfig, PresenceConfig,
};
use tunecord_protocol::{ActivityType, MAX_BUTTONS};

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the tunecord client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Connection settings.
    pub discord: DiscordSettings,

    /// What the activity looks like.
    pub presence: PresenceSettings,

    /// Intervals and delays.
    pub timing: TimingSettings,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordSettings {
    /// Application id sent in the handshake.
    pub client_id: Option<String>,

    /// Directory holding the IPC sockets.
    pub ipc_dir: Option<PathBuf>,

    /// File-name prefix of the IPC sockets.
    pub socket_prefix: String,

    /// Environment variable that marks a sandboxed process.
    pub sandbox_marker: String,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            ipc_dir: None,
            socket_prefix: DEFAULT_SOCKET_PREFIX.to_string(),
            sandbox_marker: DEFAULT_SANDBOX_MARKER.to_string(),
        }
    }
}

/// Where large images come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkSource {
    /// No artwork, only `fallback_large_image`.
    None,
    /// The snapshot's own artwork URL.
    #[default]
    Static,
    /// iTunes Search lookup.
    Itunes,
}

/// Activity appearance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// One of playing, streaming, listening, watching, competing.
    pub activity_type: String,

    /// Artwork lookup.
    pub artwork: ArtworkSource,

    /// iTunes storefront used by the `itunes` artwork source.
    pub itunes_country: String,

    /// Large image used when no artwork resolves.
    pub fallback_large_image: Option<String>,

    /// Small image key or URL.
    pub small_image: Option<String>,

    /// Hover text of the small image.
    pub small_text: Option<String>,

    /// Link buttons (`{title}`, `{artist}` and `{album}` are expanded).
    #[serde(default)]
    pub buttons: Vec<ButtonSettings>,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            activity_type: ActivityType::Listening.to_string(),
            artwork: ArtworkSource::default(),
            itunes_country: "US".to_string(),
            fallback_large_image: None,
            small_image: None,
            small_text: None,
            buttons: Vec::new(),
        }
    }
}

/// A link button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSettings {
    pub label: String,
    pub url: String,
}

/// Intervals and delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Seconds between heartbeats.
    pub heartbeat_secs: u64,

    /// Seconds before a failed connection is retried.
    pub retry_secs: u64,

    /// Seconds the peer has to answer the handshake.
    pub ready_timeout_secs: u64,

    /// Milliseconds between publish passes.
    pub publish_interval_ms: u64,

    /// Start-time drift, in seconds, treated as a seek.
    pub scrub_tolerance_secs: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: 15,
            retry_secs: 15,
            ready_timeout_secs: 10,
            publish_interval_ms: 500,
            scrub_tolerance_secs: 3.0,
        }
    }
}

/// Values given on the command line, which win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub client_id: Option<String>,
    pub ipc_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tunecord")
    }

    /// Builds the session configuration, applying `overrides`.
    pub fn to_ipc_config(&self, overrides: &Overrides) -> Result<IpcConfig, String> {
        let client_id = overrides
            .client_id
            .clone()
            .or_else(|| self.discord.client_id.clone())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                format!(
                    "no client id configured. Add to {}:\n  \
                     [discord]\n  \
                     client_id = \"YOUR_APPLICATION_ID\"\n\n  \
                     Or pass --client-id / set TUNECORD_CLIENT_ID",
                    Self::default_path().display()
                )
            })?;

        if !client_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("client id must be numeric, got '{}'", client_id));
        }

        let activity_type: ActivityType = self.presence.activity_type.parse()?;

        if self.timing.heartbeat_secs == 0 {
            return Err("timing.heartbeat_secs must be greater than zero".to_string());
        }
        if self.timing.ready_timeout_secs == 0 {
            return Err("timing.ready_timeout_secs must be greater than zero".to_string());
        }
        if self.timing.publish_interval_ms == 0 {
            return Err("timing.publish_interval_ms must be greater than zero".to_string());
        }
        let scrub_tolerance = Duration::try_from_secs_f64(self.timing.scrub_tolerance_secs)
            .map_err(|_| {
                format!(
                    "timing.scrub_tolerance_secs must be a non-negative number, got {}",
                    self.timing.scrub_tolerance_secs
                )
            })?;

        if self.presence.buttons.len() > MAX_BUTTONS {
            return Err(format!(
                "at most {} buttons are supported, found {}",
                MAX_BUTTONS,
                self.presence.buttons.len()
            ));
        }

        let mut presence = PresenceConfig {
            fallback_large_image: self.presence.fallback_large_image.clone(),
            small_image: self.presence.small_image.clone(),
            small_text: self.presence.small_text.clone(),
            ..Default::default()
        }
        .with_activity_type(activity_type)
        .with_publish_interval(Duration::from_millis(self.timing.publish_interval_ms))
        .with_scrub_tolerance(scrub_tolerance);

        for button in &self.presence.buttons {
            presence = presence.with_button(ButtonTemplate::new(&button.label, &button.url));
        }

        let mut config = IpcConfig::new(client_id)
            .with_socket_prefix(&self.discord.socket_prefix)
            .with_sandbox_marker(&self.discord.sandbox_marker)
            .with_heartbeat_interval(Duration::from_secs(self.timing.heartbeat_secs))
            .with_retry_delay(Duration::from_secs(self.timing.retry_secs))
            .with_ready_timeout(Duration::from_secs(self.timing.ready_timeout_secs))
            .with_presence(presence);

        if let Some(dir) = overrides.ipc_dir.as_ref().or(self.discord.ipc_dir.as_ref()) {
            config = config.with_ipc_dir(dir);
        }

        Ok(config)
    }
}
