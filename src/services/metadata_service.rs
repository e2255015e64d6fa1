//! Track metadata lookup: URL parsing plus an oEmbed request.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use futures::future::BoxFuture;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::state::room::{DEFAULT_TRACK_DURATION_SECS, Track};

/// Public oEmbed endpoint queried by default.
pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";
/// Bound on one metadata request.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);
const UNKNOWN_TITLE: &str = "Unknown Track";
const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// `v=` or a path separator followed by 11 id characters; the leftmost match wins.
static TRACK_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})").expect("track id pattern compiles")
});

/// Extract the 11-character track id from a watch URL (`?v=`) or a path segment
/// (`youtu.be/<id>`, `/shorts/<id>`, `/embed/<id>`, `/live/<id>`).
///
/// Longer runs of id characters yield their first 11.
pub fn extract_track_id(url: &str) -> Option<&str> {
    TRACK_ID_PATTERN
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Why a URL could not be turned into a [`Track`].
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no track id found in `{url}`")]
    NoTrackId { url: String },
    #[error("failed to build metadata HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("metadata request for `{id}` failed")]
    Request {
        id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("metadata service answered {status} for `{id}`")]
    Status { id: String, status: StatusCode },
    #[error("metadata response for `{id}` could not be decoded")]
    Decode {
        id: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Turns a user-submitted URL into a track.
pub trait TrackResolver: Send + Sync {
    /// Resolve `url` into a playable track.
    fn resolve(&self, url: &str) -> BoxFuture<'static, Result<Track, ResolveError>>;
}

/// Where and how long to ask for metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// oEmbed endpoint URL.
    pub oembed_endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            oembed_endpoint: DEFAULT_OEMBED_ENDPOINT.to_string(),
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    thumbnail_url: Option<String>,
}

/// [`TrackResolver`] backed by an oEmbed endpoint.
#[derive(Clone)]
pub struct OEmbedResolver {
    client: Client,
    endpoint: Arc<str>,
}

impl OEmbedResolver {
    /// Build the HTTP client with the configured timeout.
    pub fn new(settings: &ResolverSettings) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|source| ResolveError::ClientBuilder { source })?;

        Ok(Self {
            client,
            endpoint: Arc::from(settings.oembed_endpoint.as_str()),
        })
    }

    async fn fetch(&self, id: String) -> Result<Track, ResolveError> {
        let watch_url = format!("{WATCH_URL_PREFIX}{id}");
        debug!(%id, endpoint = %self.endpoint, "fetching track metadata");

        let response = self
            .client
            .get(self.endpoint.as_ref())
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|source| ResolveError::Request {
                id: id.clone(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(ResolveError::Status {
                id,
                status: response.status(),
            });
        }

        let body = response
            .json::<OEmbedResponse>()
            .await
            .map_err(|source| ResolveError::Decode {
                id: id.clone(),
                source,
            })?;

        Ok(Track {
            id,
            title: body.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            thumbnail: body.thumbnail_url.unwrap_or_default(),
            duration: DEFAULT_TRACK_DURATION_SECS,
        })
    }
}

impl TrackResolver for OEmbedResolver {
    fn resolve(&self, url: &str) -> BoxFuture<'static, Result<Track, ResolveError>> {
        let resolver = self.clone();
        let id = extract_track_id(url).map(str::to_owned);
        let url = url.to_owned();
        Box::pin(async move {
            match id {
                Some(id) => resolver.fetch(id).await,
                None => Err(ResolveError::NoTrackId { url }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        Json, Router,
        extract::Query,
        http::StatusCode as HttpStatus,
        response::IntoResponse,
        routing::get,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn extracts_id_from_short_link() {
        assert_eq!(
            extract_track_id("https://youtu.be/aaaaaaaaaaa"),
            Some("aaaaaaaaaaa")
        );
        assert_eq!(
            extract_track_id("https://youtu.be/dQw4w9WgXcQ?t=42"),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn extracts_id_from_watch_url() {
        assert_eq!(
            extract_track_id("https://youtube.com/watch?v=bbbbbbbbbbb"),
            Some("bbbbbbbbbbb")
        );
        assert_eq!(
            extract_track_id("https://www.youtube.com/watch?list=PL1&v=A-b_c1234Zz&t=3"),
            Some("A-b_c1234Zz")
        );
    }

    #[test]
    fn extracts_id_from_path_segments() {
        assert_eq!(
            extract_track_id("https://www.youtube.com/shorts/aaaaaaaaaaa"),
            Some("aaaaaaaaaaa")
        );
        assert_eq!(
            extract_track_id("https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_track_id("https://www.youtube.com/live/bbbbbbbbbbb"),
            Some("bbbbbbbbbbb")
        );
    }

    #[test]
    fn longer_ids_are_cut_to_eleven_characters() {
        assert_eq!(
            extract_track_id("https://youtube.com/watch?v=twelvechars1"),
            Some("twelvechars")
        );
        assert_eq!(
            extract_track_id("https://youtu.be/aaaaaaaaaaaXYZ"),
            Some("aaaaaaaaaaa")
        );
    }

    #[test]
    fn rejects_urls_without_an_eleven_character_id() {
        assert_eq!(extract_track_id("not a url"), None);
        assert_eq!(extract_track_id("https://youtu.be/short"), None);
        assert_eq!(extract_track_id("https://example.com/watch?x=aaaaaaaaaaa"), None);
        assert_eq!(extract_track_id("https://example.com/nope"), None);
    }

    async fn oembed(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        let url = params.get("url").cloned().unwrap_or_default();
        match url.rsplit("v=").next() {
            Some("aaaaaaaaaaa") => Json(json!({
                "title": "Song A",
                "thumbnail_url": "https://i.ytimg.com/vi/aaaaaaaaaaa/hqdefault.jpg"
            }))
            .into_response(),
            Some("untitled000") => Json(json!({})).into_response(),
            Some("garbage0000") => "<html>nope</html>".into_response(),
            Some("sleepy00000") => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"title": "late"})).into_response()
            }
            _ => HttpStatus::NOT_FOUND.into_response(),
        }
    }

    async fn resolver_against_stub(timeout: Duration) -> OEmbedResolver {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/oembed", get(oembed)))
                .await
                .unwrap();
        });

        OEmbedResolver::new(&ResolverSettings {
            oembed_endpoint: format!("http://{addr}/oembed"),
            timeout,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_title_and_thumbnail() {
        let resolver = resolver_against_stub(DEFAULT_RESOLVE_TIMEOUT).await;
        let track = resolver
            .resolve("https://youtu.be/aaaaaaaaaaa")
            .await
            .unwrap();

        assert_eq!(track.id, "aaaaaaaaaaa");
        assert_eq!(track.title, "Song A");
        assert_eq!(
            track.thumbnail,
            "https://i.ytimg.com/vi/aaaaaaaaaaa/hqdefault.jpg"
        );
        assert_eq!(track.duration, DEFAULT_TRACK_DURATION_SECS);
    }

    #[tokio::test]
    async fn missing_fields_fall_back() {
        let resolver = resolver_against_stub(DEFAULT_RESOLVE_TIMEOUT).await;
        let track = resolver
            .resolve("https://youtube.com/watch?v=untitled000")
            .await
            .unwrap();

        assert_eq!(track.title, UNKNOWN_TITLE);
        assert_eq!(track.thumbnail, "");
    }

    #[tokio::test]
    async fn every_failure_is_an_error() {
        let resolver = resolver_against_stub(Duration::from_millis(100)).await;

        let err = resolver.resolve("https://example.com").await.unwrap_err();
        assert!(matches!(err, ResolveError::NoTrackId { .. }));

        let err = resolver
            .resolve("https://youtu.be/unknown0000")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Status { status, .. } if status == StatusCode::NOT_FOUND));

        let err = resolver
            .resolve("https://youtu.be/garbage0000")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Decode { .. }));

        let err = resolver
            .resolve("https://youtu.be/sleepy00000")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Request { .. }));
    }
}
