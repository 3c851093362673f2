use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use crate::model::PlaybackSnapshot;

/// How long a share stays active after it was started.
pub const SHARE_LIFETIME_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i32,
    pub spotify_id: String,
    pub display_name: String,
    pub profile_pic_url: Option<String>,
    pub is_admin: bool,
}

/// Provider tokens of one user. `expires_at` is the provider's own expiry,
/// without any safety margin.
#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct StoredToken {
    pub user_id: i32,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct ActiveShare {
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

impl ActiveShare {
    pub fn starting_at(user_id: i32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            expires_at: now + Duration::hours(SHARE_LIFETIME_HOURS),
        }
    }
}

/// Last known track of a sharing user, as stored for the feed.
#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct TrackRecord {
    pub track_name: String,
    pub artist_name: String,
    pub album_cover_url: String,
    pub spotify_track_url: String,
    pub currently_playing: bool,
}

impl From<&PlaybackSnapshot> for TrackRecord {
    fn from(snapshot: &PlaybackSnapshot) -> Self {
        Self {
            track_name: snapshot.track_title.clone(),
            artist_name: snapshot.artists.clone(),
            album_cover_url: snapshot.album_art_url.clone().unwrap_or_default(),
            spotify_track_url: snapshot.external_link.clone().unwrap_or_default(),
            currently_playing: snapshot.is_playing,
        }
    }
}

/// A sharing user joined with their stored track.
#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct FeedRow {
    pub spotify_id: String,
    pub display_name: String,
    pub profile_pic_url: Option<String>,
    #[sqlx(flatten)]
    pub track: TrackRecord,
}
