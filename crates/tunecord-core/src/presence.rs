//! Media-player snapshots handed to the presence publisher.
//!
//! A [`PresenceUpdate`] is an immutable picture of what the local player is
//! doing at the moment it was polled. The publisher keeps only the latest
//! one; a new snapshot replaces the previous one wholesale.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Longest position or duration taken at face value: one week.
pub const MAX_TRACK_SECONDS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// What the local media player is playing, as seen by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    /// Track title.
    pub title: String,
    /// Track artist.
    pub artist: String,
    /// Album name, if the player reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Track length in seconds. Zero or negative means unknown.
    #[serde(default, alias = "duration_seconds", alias = "duration")]
    pub duration_seconds: f64,
    /// Playback position in seconds.
    #[serde(default, alias = "position_seconds", alias = "position")]
    pub position_seconds: f64,
    /// Player-specific artwork reference (URL, file path or persistent id).
    #[serde(default, alias = "artwork_ref", skip_serializing_if = "Option::is_none")]
    pub artwork_ref: Option<String>,
    /// Whether the player is currently playing (as opposed to paused).
    #[serde(default = "default_playing")]
    pub playing: bool,
}

fn default_playing() -> bool {
    true
}

impl PresenceUpdate {
    /// Creates a playing snapshot at position zero with unknown duration.
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration_seconds: 0.0,
            position_seconds: 0.0,
            artwork_ref: None,
            playing: true,
        }
    }

    /// Builder: set album.
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Builder: set duration in seconds.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    /// Builder: set playback position in seconds.
    pub fn with_position(mut self, seconds: f64) -> Self {
        self.position_seconds = seconds;
        self
    }

    /// Builder: set artwork reference.
    pub fn with_artwork_ref(mut self, artwork: impl Into<String>) -> Self {
        self.artwork_ref = Some(artwork.into());
        self
    }

    /// Builder: set playing state.
    pub fn with_playing(mut self, playing: bool) -> Self {
        self.playing = playing;
        self
    }

    /// Returns false when title or artist is blank, or when the position
    /// or duration exceeds [`MAX_TRACK_SECONDS`].
    ///
    /// Players report blank metadata while switching tracks or streaming
    /// ads; such snapshots are skipped rather than treated as a clear.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.artist.trim().is_empty()
            && within_range(self.position_seconds)
            && within_range(self.duration_seconds)
    }

    /// Returns the identity used for change detection and artwork caching.
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
        }
    }

    /// Returns the wall-clock instant the track would have started,
    /// given the current position.
    pub fn start_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(seconds_to_duration(self.position_seconds))
            .unwrap_or(now)
    }

    /// Returns the wall-clock instant the track will end, if the duration
    /// is known.
    pub fn end_timestamp(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.duration_seconds > 0.0 {
            self.start_timestamp(now)
                .checked_add_signed(seconds_to_duration(self.duration_seconds))
        } else {
            None
        }
    }
}

fn within_range(seconds: f64) -> bool {
    !seconds.is_finite() || seconds <= MAX_TRACK_SECONDS
}

fn seconds_to_duration(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::zero();
    }
    Duration::milliseconds((seconds.min(MAX_TRACK_SECONDS) * 1000.0).round() as i64)
}

/// Identity of a track, independent of playback position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.album {
            Some(album) => write!(f, "{} - {} ({})", self.artist, self.title, album),
            None => write!(f, "{} - {}", self.artist, self.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn blank_title_or_artist_is_invalid() {
        assert!(PresenceUpdate::new("Song", "Artist").is_valid());
        assert!(!PresenceUpdate::new("", "Artist").is_valid());
        assert!(!PresenceUpdate::new("Song", "   ").is_valid());
    }

    #[test]
    fn timestamps_follow_position_and_duration() {
        let update = PresenceUpdate::new("Song", "Artist")
            .with_duration(200.0)
            .with_position(50.0);

        let start = update.start_timestamp(now());
        let end = update.end_timestamp(now()).unwrap();

        assert_eq!(now() - start, Duration::seconds(50));
        assert_eq!(end - start, Duration::seconds(200));
    }

    #[test]
    fn unknown_duration_has_no_end() {
        let update = PresenceUpdate::new("Stream", "Radio");
        assert!(update.end_timestamp(now()).is_none());
        assert_eq!(update.start_timestamp(now()), now());
    }

    #[test]
    fn negative_position_is_clamped() {
        let update = PresenceUpdate::new("Song", "Artist").with_position(-4.0);
        assert_eq!(update.start_timestamp(now()), now());
    }

    #[test]
    fn huge_values_are_invalid_and_do_not_overflow() {
        let update = PresenceUpdate::new("Song", "Artist")
            .with_position(1e300)
            .with_duration(1e300);
        assert!(!update.is_valid());

        let start = update.start_timestamp(now());
        let end = update.end_timestamp(now()).unwrap();
        assert_eq!(now() - start, Duration::weeks(1));
        assert_eq!(end - start, Duration::weeks(1));

        assert!(
            PresenceUpdate::new("Song", "Artist")
                .with_position(MAX_TRACK_SECONDS)
                .is_valid()
        );
    }

    #[test]
    fn timestamps_saturate_near_the_calendar_edge() {
        let update = PresenceUpdate::new("Song", "Artist").with_position(60.0);
        assert_eq!(
            update.start_timestamp(DateTime::<Utc>::MIN_UTC),
            DateTime::<Utc>::MIN_UTC
        );

        let update = update.with_duration(600.0);
        assert!(update.end_timestamp(DateTime::<Utc>::MAX_UTC).is_none());
    }

    #[test]
    fn identity_ignores_position() {
        let a = PresenceUpdate::new("Song", "Artist").with_album("LP").with_position(1.0);
        let b = PresenceUpdate::new("Song", "Artist").with_album("LP").with_position(90.0);
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().to_string(), "Artist - Song (LP)");
    }

    #[test]
    fn deserializes_camel_and_snake_case() {
        let camel: PresenceUpdate = serde_json::from_str(
            r#"{"title":"A","artist":"B","durationSeconds":120,"positionSeconds":3.5}"#,
        )
        .unwrap();
        let snake: PresenceUpdate = serde_json::from_str(
            r#"{"title":"A","artist":"B","duration_seconds":120,"position_seconds":3.5}"#,
        )
        .unwrap();

        assert_eq!(camel, snake);
        assert!(camel.playing);
        assert_eq!(camel.duration_seconds, 120.0);
    }
}
