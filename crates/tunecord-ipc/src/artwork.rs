//! Album artwork resolution.
//!
//! The publisher asks an [`ArtworkResolver`] for a large-image URL once per
//! track and caches the answer, so implementations may be slow.

use std::future::Future;
use std::pin::Pin;

use tunecord_core::PresenceUpdate;

/// A boxed future for async trait methods.
///
/// Boxing keeps the trait object-safe so resolvers can be swapped at
/// runtime behind an `Arc<dyn ArtworkResolver>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Looks up a large-image URL for a track.
pub trait ArtworkResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns an image URL, or `None` if nothing suitable was found.
    fn resolve<'a>(&'a self, update: &'a PresenceUpdate) -> BoxFuture<'a, Option<String>>;
}

/// Uses the snapshot's own artwork reference when it is a web URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticArtwork;

impl ArtworkResolver for StaticArtwork {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve<'a>(&'a self, update: &'a PresenceUpdate) -> BoxFuture<'a, Option<String>> {
        let url = update.artwork_ref.as_deref().and_then(web_url);
        Box::pin(async move { url })
    }
}

/// Never resolves anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArtwork;

impl ArtworkResolver for NoArtwork {
    fn name(&self) -> &str {
        "none"
    }

    fn resolve<'a>(&'a self, _update: &'a PresenceUpdate) -> BoxFuture<'a, Option<String>> {
        Box::pin(async { None })
    }
}

fn web_url(value: &str) -> Option<String> {
    let parsed = url::Url::parse(value.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

#[cfg(feature = "itunes")]
pub use itunes::ItunesArtwork;

#[cfg(feature = "itunes")]
mod itunes {
    use std::time::Duration;

    use serde::Deserialize;
    use tracing::debug;

    use super::{ArtworkResolver, BoxFuture, StaticArtwork};
    use tunecord_core::PresenceUpdate;

    const SEARCH_URL: &str = "https://itunes.apple.com/search";

    #[derive(Debug, Deserialize)]
    struct SearchResponse {
        #[serde(default)]
        results: Vec<SearchResult>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SearchResult {
        #[serde(default)]
        pub track_name: Option<String>,
        #[serde(default)]
        pub artwork_url100: Option<String>,
    }

    /// Searches the public iTunes catalog for cover art.
    ///
    /// A web URL already present on the snapshot wins over the search.
    #[derive(Debug, Clone)]
    pub struct ItunesArtwork {
        http_client: reqwest::Client,
        country: String,
    }

    impl ItunesArtwork {
        /// Creates a resolver with the given request timeout.
        pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
            let http_client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Self {
                http_client,
                country: "US".to_string(),
            })
        }

        /// Builder: set the storefront country code.
        pub fn with_country(mut self, country: impl Into<String>) -> Self {
            self.country = country.into();
            self
        }

        async fn search(&self, update: &PresenceUpdate) -> Result<Option<String>, String> {
            let term = format!("{} {}", update.artist, update.title);
            let url = url::Url::parse_with_params(
                SEARCH_URL,
                &[
                    ("term", term.as_str()),
                    ("entity", "song"),
                    ("limit", "5"),
                    ("country", self.country.as_str()),
                ],
            )
            .map_err(|e| e.to_string())?;

            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;

            if !response.status().is_success() {
                return Err(format!("search returned {}", response.status()));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| format!("failed to read body: {e}"))?;
            let parsed: SearchResponse =
                serde_json::from_slice(&body).map_err(|e| format!("invalid response: {e}"))?;

            Ok(pick_artwork(&parsed.results, &update.title))
        }
    }

    impl ArtworkResolver for ItunesArtwork {
        fn name(&self) -> &str {
            "itunes"
        }

        fn resolve<'a>(&'a self, update: &'a PresenceUpdate) -> BoxFuture<'a, Option<String>> {
            Box::pin(async move {
                if let Some(url) = StaticArtwork.resolve(update).await {
                    return Some(url);
                }
                match self.search(update).await {
                    Ok(found) => found,
                    Err(e) => {
                        debug!(track = %update.identity(), error = %e, "Artwork search failed");
                        None
                    }
                }
            })
        }
    }

    /// Prefers a result whose track name matches, then the first one with
    /// art. Thumbnails are upgraded to 512px.
    pub(super) fn pick_artwork(results: &[SearchResult], title: &str) -> Option<String> {
        let matches_title = |r: &&SearchResult| {
            r.track_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(title.trim()))
        };

        results
            .iter()
            .filter(|r| r.artwork_url100.is_some())
            .find(matches_title)
            .or_else(|| results.iter().find(|r| r.artwork_url100.is_some()))
            .and_then(|r| r.artwork_url100.as_deref())
            .map(|url| url.replace("100x100bb", "512x512bb"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_artwork_accepts_web_urls() {
        let update = PresenceUpdate::new("Song", "Artist")
            .with_artwork_ref("https://img.example/cover.jpg");
        assert_eq!(
            StaticArtwork.resolve(&update).await.as_deref(),
            Some("https://img.example/cover.jpg")
        );
    }

    #[tokio::test]
    async fn static_artwork_ignores_local_refs() {
        let local = PresenceUpdate::new("Song", "Artist").with_artwork_ref("/tmp/cover.jpg");
        assert!(StaticArtwork.resolve(&local).await.is_none());

        let missing = PresenceUpdate::new("Song", "Artist");
        assert!(StaticArtwork.resolve(&missing).await.is_none());
        assert!(NoArtwork.resolve(&missing).await.is_none());
    }

    #[cfg(feature = "itunes")]
    #[test]
    fn itunes_prefers_matching_track() {
        use super::itunes::{SearchResult, pick_artwork};

        let results = vec![
            SearchResult {
                track_name: Some("Other Song".into()),
                artwork_url100: Some("https://is1.example/a/100x100bb.jpg".into()),
            },
            SearchResult {
                track_name: Some("hey jude".into()),
                artwork_url100: Some("https://is1.example/b/100x100bb.jpg".into()),
            },
        ];

        assert_eq!(
            pick_artwork(&results, "Hey Jude").as_deref(),
            Some("https://is1.example/b/512x512bb.jpg")
        );
        assert_eq!(
            pick_artwork(&results, "Unknown").as_deref(),
            Some("https://is1.example/a/512x512bb.jpg")
        );
        assert!(pick_artwork(&[], "Hey Jude").is_none());
    }
}
