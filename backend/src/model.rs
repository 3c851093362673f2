use relay_core::types::NowPlaying;
use serde::Deserialize;

/// Body of the provider's "currently playing" response.
///
/// Only the fields the relay reads are modelled. Each nesting level is
/// optional because the provider omits whole objects for ads, podcasts and
/// private sessions.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPlayback {
    #[serde(default)]
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<RawItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawItem {
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<RawArtist>,
    pub album: Option<RawAlbum>,
    pub external_urls: Option<RawExternalUrls>,
    pub duration_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawArtist {
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawAlbum {
    #[serde(default)]
    pub images: Vec<RawImage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawImage {
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawExternalUrls {
    pub spotify: Option<String>,
}

impl RawItem {
    pub fn first_image_url(&self) -> Option<String> {
        self.album
            .as_ref()
            .and_then(|album| album.images.first())
            .and_then(|image| image.url.clone())
    }

    pub fn spotify_link(&self) -> Option<String> {
        self.external_urls
            .as_ref()
            .and_then(|urls| urls.spotify.clone())
    }
}

/// Successful answer of the provider token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    /// Present only when the provider rotates the refresh token.
    pub refresh_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// Normalized playback state, recomputed on every poll.
///
/// Equality is field-wise; two independently built snapshots with the same
/// fields compare equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub track_title: String,
    /// Artist names in provider order, joined with `", "`.
    pub artists: String,
    pub album_art_url: Option<String>,
    pub external_link: Option<String>,
    pub progress_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl PlaybackSnapshot {
    /// "Title by Artist", or the bare title when no artist is known.
    pub fn display_line(&self) -> String {
        if self.artists.is_empty() {
            self.track_title.clone()
        } else {
            format!("{} by {}", self.track_title, self.artists)
        }
    }
}

impl From<&PlaybackSnapshot> for NowPlaying {
    fn from(snapshot: &PlaybackSnapshot) -> Self {
        NowPlaying {
            current_track: snapshot.display_line(),
            album_cover: snapshot.album_art_url.clone(),
            spotify_link: snapshot.external_link.clone(),
            currently_playing: snapshot.is_playing,
            progress_ms: snapshot.progress_ms,
            duration_ms: snapshot.duration_ms,
        }
    }
}
