use chrono::{DateTime, Duration, Utc};
use relay_core::types::TrackFeedItem;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    credentials::{expiry_after, EXPIRY_MARGIN_SECS},
    error::RelayError,
    normalize::normalize,
    persistence::{
        model::{StoredToken, TrackRecord},
        Store,
    },
    provider::Provider,
};

/// Outcome counts of one batch update run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateSummary {
    pub updated: usize,
    pub skipped: usize,
    /// Users whose sharing was stopped because their grant was revoked.
    pub unshared: usize,
}

enum UserOutcome {
    Updated,
    Skipped,
    Unshared,
}

/// Refreshes the stored track of every actively sharing user.
///
/// A rejected refresh stops that user's sharing; any other provider failure
/// only skips the user for this run. Storage failures abort the run.
pub async fn update_playing(store: &Store, provider: &Provider) -> Result<UpdateSummary, RelayError> {
    let mut summary = UpdateSummary::default();

    for share in store.list_active_shares().await? {
        match update_user(store, provider, share.user_id, Utc::now()).await? {
            UserOutcome::Updated => summary.updated += 1,
            UserOutcome::Skipped => summary.skipped += 1,
            UserOutcome::Unshared => summary.unshared += 1,
        }
    }

    info!(
        "track update finished: {} updated, {} skipped, {} unshared",
        summary.updated, summary.skipped, summary.unshared
    );
    Ok(summary)
}

async fn update_user(
    store: &Store,
    provider: &Provider,
    user_id: i32,
    now: DateTime<Utc>,
) -> Result<UserOutcome, RelayError> {
    let token = match store.get_token_by_user(user_id).await? {
        Some(token) => token,
        None => {
            warn!("user {} is sharing without a stored token", user_id);
            return Ok(UserOutcome::Skipped);
        }
    };

    let access_token = if needs_refresh(&token, now) {
        match provider.refresh_access_token(&token.refresh_token).await {
            Ok(grant) => {
                let refresh_token = grant.refresh_token.as_deref().unwrap_or(&token.refresh_token);
                let expires_at = match expiry_after(now, grant.expires_in) {
                    Ok(expires_at) => expires_at,
                    Err(err) => {
                        warn!("skipping user {}: {}", user_id, err);
                        return Ok(UserOutcome::Skipped);
                    }
                };
                store
                    .update_token(user_id, &grant.access_token, refresh_token, expires_at)
                    .await?;
                grant.access_token
            }
            Err(RelayError::ProviderAuth(reason)) => {
                warn!("refresh rejected for user {}, stopping share: {}", user_id, reason);
                store.stop_sharing(user_id).await?;
                return Ok(UserOutcome::Unshared);
            }
            Err(err) => {
                warn!("could not refresh token of user {}: {}", user_id, err);
                return Ok(UserOutcome::Skipped);
            }
        }
    } else {
        token.access_token
    };

    let playback = match provider.fetch_playing(&access_token).await {
        Ok(playback) => playback,
        Err(err) => {
            warn!("skipping user {}: {}", user_id, err);
            return Ok(UserOutcome::Skipped);
        }
    };

    let snapshot = normalize(playback.as_ref());
    store
        .upsert_track(user_id, &TrackRecord::from(&snapshot))
        .await?;
    Ok(UserOutcome::Updated)
}

fn needs_refresh(token: &StoredToken, now: DateTime<Utc>) -> bool {
    now + Duration::seconds(EXPIRY_MARGIN_SECS) >= token.expires_at
}

/// The shared feed: one entry per active share with a stored track.
pub async fn feed(store: &Store) -> Result<Vec<TrackFeedItem>, RelayError> {
    let rows = store.get_feed().await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let current_track = if row.track.artist_name.is_empty() {
                row.track.track_name
            } else {
                format!("{} by {}", row.track.track_name, row.track.artist_name)
            };
            TrackFeedItem {
                user_id: row.spotify_id,
                display_name: row.display_name,
                spotify_profile_pic: row.profile_pic_url,
                current_track,
                album_cover: row.track.album_cover_url,
                spotify_link: row.track.spotify_track_url,
                currently_playing: row.track.currently_playing,
            }
        })
        .collect())
}
