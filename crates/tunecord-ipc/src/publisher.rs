//! Presence publishing.
//!
//! The publisher keeps the most recent [`PresenceUpdate`] in a latest-value
//! cell and, on every tick while the session is ready, compares it with
//! what was last sent. Only a new track, a play/pause change or a seek
//! produces a `SET_ACTIVITY` command.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tunecord_core::{PresenceUpdate, TrackIdentity};
use tunecord_protocol::{Activity, Assets, Command, SetActivityArgs};

use crate::artwork::{ArtworkResolver, StaticArtwork};
use crate::config::PresenceConfig;
use crate::error::{IpcError, IpcResult};
use crate::session::Session;

const ARTWORK_CACHE_LIMIT: usize = 64;

/// Result of one publish pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A `SET_ACTIVITY` command was written.
    Sent,
    /// Same track, same play state and no seek.
    Unchanged,
    /// The session is not ready; nothing was sent or kept.
    NotReady,
    /// No snapshot has been submitted.
    Empty,
    /// The snapshot has no title or artist, or an out-of-range position
    /// or duration.
    Invalid,
    /// The snapshot was cleared or replaced by another track while the
    /// pass was running; nothing was sent.
    Superseded,
}

#[derive(Debug, Clone)]
struct SentPresence {
    identity: TrackIdentity,
    start: DateTime<Utc>,
    playing: bool,
}

#[derive(Default)]
struct PublishState {
    last_sent: Option<SentPresence>,
    artwork: HashMap<TrackIdentity, Option<String>>,
}

/// Turns presence snapshots into `SET_ACTIVITY` commands.
pub struct Publisher {
    session: Session,
    config: PresenceConfig,
    resolver: Arc<dyn ArtworkResolver>,
    latest: watch::Sender<Option<PresenceUpdate>>,
    state: Mutex<PublishState>,
}

impl Publisher {
    /// Creates a publisher using [`StaticArtwork`].
    pub fn new(session: Session, config: PresenceConfig) -> Self {
        Self {
            session,
            config,
            resolver: Arc::new(StaticArtwork),
            latest: watch::Sender::new(None),
            state: Mutex::new(PublishState::default()),
        }
    }

    /// Builder: set the artwork resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ArtworkResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the latest snapshot. Never blocks.
    pub fn submit(&self, update: PresenceUpdate) {
        self.latest.send_replace(Some(update));
    }

    /// Returns the latest snapshot.
    pub fn latest(&self) -> Option<PresenceUpdate> {
        self.latest.borrow().clone()
    }

    /// Drops the snapshot and clears the presence if the session is ready.
    ///
    /// Waits for a publish pass in progress, so the clear is always the
    /// last command the peer sees.
    pub async fn clear(&self) -> IpcResult<()> {
        self.latest.send_replace(None);
        let mut state = self.state.lock().await;
        state.last_sent = None;

        if !self.session.is_ready() {
            return Ok(());
        }

        match self
            .session
            .send_command(Command::SetActivity, SetActivityArgs::clear(std::process::id()))
            .await
        {
            Ok(_) => {
                info!("Presence cleared");
                Ok(())
            }
            Err(IpcError::NotReady) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Compares the latest snapshot with the last one sent and publishes
    /// it if they differ.
    pub async fn publish(&self, now: DateTime<Utc>) -> IpcResult<PublishOutcome> {
        // Held for the whole pass; clear() takes it too.
        let mut state = self.state.lock().await;

        if !self.session.is_ready() {
            state.last_sent = None;
            return Ok(PublishOutcome::NotReady);
        }

        let Some(update) = self.latest() else {
            return Ok(PublishOutcome::Empty);
        };
        if !update.is_valid() {
            debug!("Ignoring snapshot without title or artist, or out of range");
            return Ok(PublishOutcome::Invalid);
        }

        let sent = SentPresence {
            identity: update.identity(),
            start: update.start_timestamp(now),
            playing: update.playing,
        };

        if let Some(ref last) = state.last_sent
            && self.is_same(last, &sent)
        {
            return Ok(PublishOutcome::Unchanged);
        }

        let artwork = self.artwork_for(&mut state, &update).await;
        if self.is_superseded(&sent) {
            debug!(track = %sent.identity, "Snapshot replaced while resolving artwork");
            return Ok(PublishOutcome::Superseded);
        }
        let activity = self.build_activity(&update, now, artwork);

        match self
            .session
            .send_command(
                Command::SetActivity,
                SetActivityArgs::set(std::process::id(), activity),
            )
            .await
        {
            Ok(_) => {}
            Err(IpcError::NotReady) => {
                state.last_sent = None;
                return Ok(PublishOutcome::NotReady);
            }
            Err(e) => {
                state.last_sent = None;
                return Err(e);
            }
        }

        info!(track = %sent.identity, playing = sent.playing, "Presence published");
        state.last_sent = Some(sent);
        Ok(PublishOutcome::Sent)
    }

    /// Publishes on every tick until `shutdown` turns true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.publish_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            interval_ms = self.config.publish_interval.as_millis() as u64,
            "Publisher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish(Utc::now()).await {
                        warn!(error = %e, "Failed to publish presence");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Publisher stopped");
    }

    fn is_same(&self, last: &SentPresence, next: &SentPresence) -> bool {
        if last.identity != next.identity || last.playing != next.playing {
            return false;
        }
        if !next.playing {
            return true;
        }

        let drift = (next.start - last.start).abs();
        let tolerance = chrono::Duration::from_std(self.config.scrub_tolerance)
            .unwrap_or(chrono::Duration::MAX);
        drift <= tolerance
    }

    /// True when the cell was cleared, or now holds another track or play
    /// state, since `sent` was read from it.
    fn is_superseded(&self, sent: &SentPresence) -> bool {
        match &*self.latest.borrow() {
            Some(latest) => {
                latest.playing != sent.playing || latest.identity() != sent.identity
            }
            None => true,
        }
    }

    async fn artwork_for(
        &self,
        state: &mut PublishState,
        update: &PresenceUpdate,
    ) -> Option<String> {
        let identity = update.identity();
        if let Some(cached) = state.artwork.get(&identity) {
            return cached.clone();
        }

        let resolved = self.resolver.resolve(update).await;
        debug!(
            resolver = self.resolver.name(),
            track = %identity,
            found = resolved.is_some(),
            "Artwork resolved"
        );

        if state.artwork.len() >= ARTWORK_CACHE_LIMIT {
            state.artwork.clear();
        }
        state.artwork.insert(identity, resolved.clone());
        resolved
    }

    fn build_activity(
        &self,
        update: &PresenceUpdate,
        now: DateTime<Utc>,
        artwork: Option<String>,
    ) -> Activity {
        let (start, end) = if update.playing {
            (
                Some(update.start_timestamp(now).timestamp_millis()),
                update.end_timestamp(now).map(|end| end.timestamp_millis()),
            )
        } else {
            (None, None)
        };

        let large_text = update
            .album
            .clone()
            .filter(|album| !album.trim().is_empty())
            .unwrap_or_else(|| update.title.clone());

        let mut activity = Activity::new(self.config.activity_type)
            .with_details(&update.title)
            .with_state(&update.artist)
            .with_timestamps(start, end)
            .with_assets(Assets {
                large_image: artwork.or_else(|| self.config.fallback_large_image.clone()),
                large_text: Some(large_text),
                small_image: self.config.small_image.clone(),
                small_text: self.config.small_text.clone(),
            });

        for button in &self.config.buttons {
            match button.render(update) {
                Some(url) => activity = activity.with_button(&button.label, url),
                None => debug!(label = %button.label, "Skipping button with invalid URL"),
            }
        }

        activity
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::artwork::BoxFuture;
    use crate::config::{ButtonTemplate, IpcConfig};
    use crate::testing::{Peer, WAIT, ready};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::DuplexStream;
    use tunecord_protocol::Opcode;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn song_a() -> PresenceUpdate {
        PresenceUpdate::new("Song A", "Artist")
            .with_duration(200.0)
            .with_position(0.0)
    }

    async fn ready_publisher(config: PresenceConfig) -> (Publisher, Peer<DuplexStream>) {
        let session = Session::new(&IpcConfig::new("4242"));
        let peer = ready(&session).await;
        (Publisher::new(session, config), peer)
    }

    async fn next_command(peer: &mut Peer<DuplexStream>) -> Value {
        peer.expect_opcode(Opcode::Frame).await.json().unwrap()
    }

    /// Asserts the peer received nothing else.
    async fn assert_silent(peer: &mut Peer<DuplexStream>) {
        let next = tokio::time::timeout(Duration::from_millis(50), peer.reader.read_frame()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }

    #[tokio::test]
    async fn publishes_track_with_timestamps() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;
        publisher.submit(song_a());

        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);

        let command = next_command(&mut peer).await;
        assert_eq!(command["cmd"], "SET_ACTIVITY");
        let activity = &command["args"]["activity"];
        assert_eq!(activity["type"], 2);
        assert_eq!(activity["details"], "Song A");
        assert_eq!(activity["state"], "Artist");

        let start = activity["timestamps"]["start"].as_i64().unwrap();
        let end = activity["timestamps"]["end"].as_i64().unwrap();
        assert_eq!(start, 1_700_000_000_000);
        assert_eq!(end - start, 200_000);
        assert_eq!(command["args"]["pid"], std::process::id());
    }

    #[tokio::test]
    async fn identical_snapshots_publish_once() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(song_a());
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);

        // Playback advanced 10 s in 10 s of wall time: no drift.
        publisher.submit(song_a().with_position(10.0));
        let later = now() + chrono::Duration::seconds(10);
        assert_eq!(publisher.publish(later).await.unwrap(), PublishOutcome::Unchanged);

        next_command(&mut peer).await;
        assert_silent(&mut peer).await;
    }

    #[tokio::test]
    async fn drift_within_tolerance_is_ignored() {
        let (publisher, _peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(song_a());
        publisher.publish(now()).await.unwrap();

        publisher.submit(song_a().with_position(2.5));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Unchanged);
    }

    #[tokio::test]
    async fn seek_republishes() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(song_a());
        publisher.publish(now()).await.unwrap();
        next_command(&mut peer).await;

        publisher.submit(song_a().with_position(60.0));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);

        let command = next_command(&mut peer).await;
        let start = command["args"]["activity"]["timestamps"]["start"]
            .as_i64()
            .unwrap();
        assert_eq!(start, 1_700_000_000_000 - 60_000);
    }

    #[tokio::test]
    async fn scrub_tolerance_is_configurable() {
        let config = PresenceConfig::default().with_scrub_tolerance(Duration::from_secs(30));
        let (publisher, _peer) = ready_publisher(config).await;

        publisher.submit(song_a());
        publisher.publish(now()).await.unwrap();

        publisher.submit(song_a().with_position(20.0));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Unchanged);
    }

    #[tokio::test]
    async fn new_track_republishes() {
        let (publisher, _peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(song_a());
        publisher.publish(now()).await.unwrap();

        publisher.submit(song_a().with_album("Live"));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);
    }

    #[tokio::test]
    async fn paused_track_has_no_timestamps() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(song_a().with_playing(false));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);

        let command = next_command(&mut peer).await;
        assert!(command["args"]["activity"].get("timestamps").is_none());

        // Position changes while paused do not count as seeks.
        publisher.submit(song_a().with_playing(false).with_position(90.0));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Unchanged);

        publisher.submit(song_a().with_position(90.0));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);
    }

    #[tokio::test]
    async fn empty_title_is_suppressed_not_cleared() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(PresenceUpdate::new("  ", "Artist"));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Invalid);
        publisher.submit(PresenceUpdate::new("Song", ""));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Invalid);

        assert_silent(&mut peer).await;
    }

    #[tokio::test]
    async fn nothing_submitted_is_empty() {
        let (publisher, _peer) = ready_publisher(PresenceConfig::default()).await;
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Empty);
    }

    #[tokio::test]
    async fn not_ready_sends_nothing_and_resets() {
        let session = Session::new(&IpcConfig::new("4242"));
        let publisher = Publisher::new(session.clone(), PresenceConfig::default());
        publisher.submit(song_a());

        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::NotReady);

        let mut peer = ready(&session).await;
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);
        next_command(&mut peer).await;

        // A reconnect forgets what was sent and publishes again.
        drop(peer);
        let mut status = session.subscribe();
        tokio::time::timeout(WAIT, status.wait_for(|s| s.failure().is_some()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::NotReady);

        let _peer = ready(&session).await;
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);
    }

    #[tokio::test]
    async fn clear_sends_null_activity() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;
        publisher.submit(song_a());

        publisher.clear().await.unwrap();
        assert!(publisher.latest().is_none());

        let command = next_command(&mut peer).await;
        assert_eq!(command["args"]["activity"], Value::Null);
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Empty);
    }

    #[tokio::test]
    async fn clear_when_not_ready_only_empties_cell() {
        let session = Session::new(&IpcConfig::new("4242"));
        let publisher = Publisher::new(session, PresenceConfig::default());
        publisher.submit(song_a());

        publisher.clear().await.unwrap();
        assert!(publisher.latest().is_none());
    }

    #[tokio::test]
    async fn assets_and_buttons() {
        let config = PresenceConfig {
            fallback_large_image: Some("logo".into()),
            small_image: Some("player".into()),
            small_text: Some("Music".into()),
            ..Default::default()
        }
        .with_button(ButtonTemplate::new(
            "Search",
            "https://music.example/search?q={title}",
        ))
        .with_button(ButtonTemplate::new("Broken", "ftp://{title}"));

        let (publisher, mut peer) = ready_publisher(config).await;
        publisher.submit(song_a().with_album("First Album"));
        publisher.publish(now()).await.unwrap();

        let command = next_command(&mut peer).await;
        let activity = &command["args"]["activity"];
        assert_eq!(
            activity["assets"],
            json!({
                "large_image": "logo",
                "large_text": "First Album",
                "small_image": "player",
                "small_text": "Music"
            })
        );
        assert_eq!(
            activity["buttons"],
            json!([{"label": "Search", "url": "https://music.example/search?q=Song%20A"}])
        );
    }

    struct CountingResolver(AtomicU32);

    impl ArtworkResolver for CountingResolver {
        fn name(&self) -> &str {
            "counting"
        }

        fn resolve<'a>(&'a self, _update: &'a PresenceUpdate) -> BoxFuture<'a, Option<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Some("https://img.example/cover.jpg".to_string()) })
        }
    }

    #[tokio::test]
    async fn artwork_is_cached_per_track() {
        let resolver = Arc::new(CountingResolver(AtomicU32::new(0)));
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;
        let publisher = publisher.with_resolver(resolver.clone());

        publisher.submit(song_a());
        publisher.publish(now()).await.unwrap();
        let command = next_command(&mut peer).await;
        assert_eq!(
            command["args"]["activity"]["assets"]["large_image"],
            "https://img.example/cover.jpg"
        );

        // Seek within the same track reuses the cached artwork.
        publisher.submit(song_a().with_position(100.0));
        publisher.publish(now()).await.unwrap();
        assert_eq!(resolver.0.load(Ordering::SeqCst), 1);

        publisher.submit(PresenceUpdate::new("Song B", "Artist"));
        publisher.publish(now()).await.unwrap();
        assert_eq!(resolver.0.load(Ordering::SeqCst), 2);
    }

    struct SlowResolver(Duration);

    impl ArtworkResolver for SlowResolver {
        fn name(&self) -> &str {
            "slow"
        }

        fn resolve<'a>(&'a self, _update: &'a PresenceUpdate) -> BoxFuture<'a, Option<String>> {
            Box::pin(async move {
                tokio::time::sleep(self.0).await;
                Some("https://img.example/slow.jpg".to_string())
            })
        }
    }

    #[tokio::test]
    async fn clear_during_artwork_lookup_wins() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;
        let publisher = Arc::new(
            publisher.with_resolver(Arc::new(SlowResolver(Duration::from_millis(200)))),
        );
        publisher.submit(song_a());

        let pass = tokio::spawn({
            let publisher = publisher.clone();
            async move { publisher.publish(now()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        publisher.clear().await.unwrap();

        let outcome = tokio::time::timeout(WAIT, pass).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), PublishOutcome::Superseded);

        // Only the clear reaches the peer.
        let command = next_command(&mut peer).await;
        assert_eq!(command["args"]["activity"], Value::Null);
        assert_silent(&mut peer).await;
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Empty);
    }

    #[tokio::test]
    async fn track_change_during_artwork_lookup_is_published_next_tick() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;
        let publisher = Arc::new(
            publisher.with_resolver(Arc::new(SlowResolver(Duration::from_millis(100)))),
        );
        publisher.submit(song_a());

        let pass = tokio::spawn({
            let publisher = publisher.clone();
            async move { publisher.publish(now()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.submit(PresenceUpdate::new("Song B", "Artist"));

        let outcome = tokio::time::timeout(WAIT, pass).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), PublishOutcome::Superseded);

        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);
        let command = next_command(&mut peer).await;
        assert_eq!(command["args"]["activity"]["details"], "Song B");
        assert_silent(&mut peer).await;
    }

    #[tokio::test]
    async fn out_of_range_position_is_invalid() {
        let (publisher, mut peer) = ready_publisher(PresenceConfig::default()).await;

        publisher.submit(PresenceUpdate::new("Song A", "Artist").with_position(1e300));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Invalid);
        publisher.submit(song_a().with_duration(1e300));
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Invalid);
        assert_silent(&mut peer).await;

        // The next sane snapshot still goes out.
        publisher.submit(song_a());
        assert_eq!(publisher.publish(now()).await.unwrap(), PublishOutcome::Sent);
    }

    #[tokio::test]
    async fn run_publishes_until_shutdown() {
        let (publisher, mut peer) = ready_publisher(
            PresenceConfig::default().with_publish_interval(Duration::from_millis(10)),
        )
        .await;
        let publisher = Arc::new(publisher);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(publisher.clone().run(shutdown_rx));
        publisher.submit(song_a());

        let command = next_command(&mut peer).await;
        assert_eq!(command["args"]["activity"]["details"], "Song A");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }
}
