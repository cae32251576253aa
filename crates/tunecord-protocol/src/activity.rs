//! `SET_ACTIVITY` payload types.
//!
//! The peer rejects the whole command when a text field is shorter than
//! [`MIN_TEXT_LEN`] or longer than [`MAX_TEXT_LEN`] characters, so the
//! builder methods normalize text before it reaches the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Longest accepted text field, in characters.
pub const MAX_TEXT_LEN: usize = 128;
/// Shortest accepted text field, in characters.
pub const MIN_TEXT_LEN: usize = 2;
/// Longest accepted button label, in characters.
pub const MAX_BUTTON_LABEL_LEN: usize = 32;
/// Maximum number of buttons on one activity.
pub const MAX_BUTTONS: usize = 2;

/// Fits `text` into `[MIN_TEXT_LEN, max]` characters.
///
/// Long text is cut and terminated with an ellipsis; short text is padded
/// with zero-width spaces so it renders unchanged.
pub fn clamp_text(text: &str, max: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();

    if count > max {
        let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        return cut;
    }

    let mut out = text.to_string();
    for _ in count..MIN_TEXT_LEN {
        out.push('\u{200B}');
    }
    out
}

/// Activity kind, serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityType {
    Playing,
    Streaming,
    #[default]
    Listening,
    Watching,
    Competing,
}

impl ActivityType {
    pub fn code(self) -> u8 {
        match self {
            Self::Playing => 0,
            Self::Streaming => 1,
            Self::Listening => 2,
            Self::Watching => 3,
            Self::Competing => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Playing),
            1 => Some(Self::Streaming),
            2 => Some(Self::Listening),
            3 => Some(Self::Watching),
            5 => Some(Self::Competing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Streaming => "streaming",
            Self::Listening => "listening",
            Self::Watching => "watching",
            Self::Competing => "competing",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "playing" => Ok(Self::Playing),
            "streaming" => Ok(Self::Streaming),
            "listening" => Ok(Self::Listening),
            "watching" => Ok(Self::Watching),
            "competing" => Ok(Self::Competing),
            other => Err(format!(
                "unknown activity type '{other}' (expected playing, streaming, listening, watching or competing)"
            )),
        }
    }
}

impl Serialize for ActivityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown activity type {code}")))
    }
}

/// Unix millisecond timestamps driving the elapsed/remaining bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Image keys or URLs and their hover texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

impl Assets {
    pub fn is_empty(&self) -> bool {
        self.large_image.is_none()
            && self.large_text.is_none()
            && self.small_image.is_none()
            && self.small_text.is_none()
    }
}

/// A link button shown under the activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}

/// Rich presence activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type", default)]
    pub kind: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<Assets>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

impl Activity {
    pub fn new(kind: ActivityType) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Builder: set the second line (the artist, for music).
    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(clamp_text(state, MAX_TEXT_LEN));
        self
    }

    /// Builder: set the first line (the track title, for music).
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(clamp_text(details, MAX_TEXT_LEN));
        self
    }

    /// Builder: set start/end timestamps in unix milliseconds.
    pub fn with_timestamps(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.timestamps = if start.is_none() && end.is_none() {
            None
        } else {
            Some(Timestamps { start, end })
        };
        self
    }

    /// Builder: set assets; hover texts are clamped, empty assets dropped.
    pub fn with_assets(mut self, mut assets: Assets) -> Self {
        assets.large_text = assets.large_text.map(|t| clamp_text(&t, MAX_TEXT_LEN));
        assets.small_text = assets.small_text.map(|t| clamp_text(&t, MAX_TEXT_LEN));
        self.assets = (!assets.is_empty()).then_some(assets);
        self
    }

    /// Builder: append a button. Buttons past [`MAX_BUTTONS`] are ignored.
    pub fn with_button(mut self, label: &str, url: impl Into<String>) -> Self {
        if self.buttons.len() < MAX_BUTTONS {
            self.buttons.push(Button {
                label: clamp_text(label, MAX_BUTTON_LABEL_LEN),
                url: url.into(),
            });
        }
        self
    }
}

/// Arguments of the `SET_ACTIVITY` command. A `None` activity clears the
/// presence and is sent as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetActivityArgs {
    pub pid: u32,
    pub activity: Option<Activity>,
}

impl SetActivityArgs {
    pub fn set(pid: u32, activity: Activity) -> Self {
        Self {
            pid,
            activity: Some(activity),
        }
    }

    pub fn clear(pid: u32) -> Self {
        Self {
            pid,
            activity: None,
        }
    }
}
