use crate::model::{PlaybackSnapshot, RawPlayback};

pub const NOT_PLAYING: &str = "Not currently playing";
pub const HIDDEN_CONTENT: &str = "Playing content not exposed by the provider";
pub const UNKNOWN_TRACK: &str = "Unknown Track";

/// Maps a provider payload to the stable snapshot shape. Pure.
///
/// `None` (the provider answered "no content") and paused playback both
/// produce the "not playing" record. Playback without an item (the provider
/// hides some content types) is reported as playing with a placeholder title.
pub fn normalize(raw: Option<&RawPlayback>) -> PlaybackSnapshot {
    let playback = match raw {
        Some(playback) if playback.is_playing => playback,
        _ => return placeholder(false, NOT_PLAYING),
    };

    let item = match &playback.item {
        Some(item) => item,
        None => return placeholder(true, HIDDEN_CONTENT),
    };

    let artists = item
        .artists
        .iter()
        .filter_map(|artist| artist.name.as_deref())
        .collect::<Vec<_>>()
        .join(", ");

    PlaybackSnapshot {
        is_playing: true,
        track_title: item.name.clone().unwrap_or_else(|| UNKNOWN_TRACK.to_owned()),
        artists,
        album_art_url: item.first_image_url(),
        external_link: item.spotify_link(),
        progress_ms: playback.progress_ms,
        duration_ms: item.duration_ms,
    }
}

fn placeholder(is_playing: bool, title: &str) -> PlaybackSnapshot {
    PlaybackSnapshot {
        is_playing,
        track_title: title.to_owned(),
        artists: String::new(),
        album_art_url: None,
        external_link: None,
        progress_ms: None,
        duration_ms: None,
    }
}
