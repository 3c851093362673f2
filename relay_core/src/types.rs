use serde::{Deserialize, Serialize};

/// The normalized "now playing" record every consumer endpoint publishes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NowPlaying {
    pub current_track: String,
    pub album_cover: Option<String>,
    pub spotify_link: Option<String>,
    pub currently_playing: bool,
    pub progress_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// Terminal error message sent to a consumer before its channel is closed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorFrame {
    pub error: String,
    pub message: String,
}

impl ErrorFrame {
    pub const SERVER_MISCONFIGURED: &'static str = "server_misconfigured";
    pub const PROVIDER_AUTH_FAILED: &'static str = "provider_auth_failed";
    pub const PROVIDER_API_ERROR: &'static str = "provider_api_error";
    pub const STREAMING_ERROR: &'static str = "streaming_error";

    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_owned(),
            message: message.into(),
        }
    }
}

/// One unit pushed over a stream or socket channel.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Snapshot(NowPlaying),
    Error(ErrorFrame),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ShareRequest {
    pub spotify_id: String,
}

/// One entry of the shared multi-user feed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackFeedItem {
    pub user_id: String,
    pub display_name: String,
    pub spotify_profile_pic: Option<String>,
    pub current_track: String,
    pub album_cover: String,
    pub spotify_link: String,
    pub currently_playing: bool,
}

/// Plain acknowledgement body used by the sharing and auth routes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
