use std::{collections::BTreeMap, sync::Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::{
    model::{ActiveShare, FeedRow, StoredToken, TrackRecord, User},
    PersistentStore,
};

/// In-process store used by route and batch-task tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    tokens: BTreeMap<i32, StoredToken>,
    shares: BTreeMap<i32, ActiveShare>,
    tracks: BTreeMap<i32, TrackRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self, user_id: i32) -> Option<StoredToken> {
        self.inner.lock().unwrap().tokens.get(&user_id).cloned()
    }

    pub fn track(&self, user_id: i32) -> Option<TrackRecord> {
        self.inner.lock().unwrap().tracks.get(&user_id).cloned()
    }

    pub fn is_sharing(&self, user_id: i32) -> bool {
        self.inner.lock().unwrap().shares.contains_key(&user_id)
    }

    pub fn expire_share(&self, user_id: i32) {
        if let Some(share) = self.inner.lock().unwrap().shares.get_mut(&user_id) {
            share.expires_at = Utc::now() - chrono::Duration::minutes(1);
        }
    }
}

#[rocket::async_trait]
impl PersistentStore for MemoryStore {
    async fn create_tables(&self) -> Result<()> {
        Ok(())
    }

    async fn get_user_by_spotify_id(&self, spotify_id: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|user| user.spotify_id == spotify_id)
            .cloned())
    }

    async fn create_user(
        &self,
        spotify_id: &str,
        display_name: &str,
        profile_pic_url: Option<&str>,
    ) -> Result<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|user| user.spotify_id == spotify_id) {
            return Err(anyhow!("duplicate spotify id {}", spotify_id));
        }
        let user = User {
            id: inner.users.len() as i32 + 1,
            spotify_id: spotify_id.to_owned(),
            display_name: display_name.to_owned(),
            profile_pic_url: profile_pic_url.map(str::to_owned),
            is_admin: inner.users.is_empty(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn get_token_by_user(&self, user_id: i32) -> Result<Option<StoredToken>> {
        Ok(self.token(user_id))
    }

    async fn update_token(
        &self,
        user_id: i32,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.lock().unwrap().tokens.insert(
            user_id,
            StoredToken {
                user_id,
                access_token: access_token.to_owned(),
                refresh_token: refresh_token.to_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn start_sharing(&self, user_id: i32) -> Result<ActiveShare> {
        let share = ActiveShare::starting_at(user_id, Utc::now());
        self.inner
            .lock()
            .unwrap()
            .shares
            .insert(user_id, share.clone());
        Ok(share)
    }

    async fn stop_sharing(&self, user_id: i32) -> Result<()> {
        self.inner.lock().unwrap().shares.remove(&user_id);
        Ok(())
    }

    async fn list_active_shares(&self) -> Result<Vec<ActiveShare>> {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .shares
            .values()
            .filter(|share| share.expires_at > now)
            .cloned()
            .collect())
    }

    async fn upsert_track(&self, user_id: i32, track: &TrackRecord) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .insert(user_id, track.clone());
        Ok(())
    }

    async fn get_feed(&self) -> Result<Vec<FeedRow>> {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|user| {
                inner
                    .shares
                    .get(&user.id)
                    .map_or(false, |share| share.expires_at > now)
            })
            .filter_map(|user| {
                inner.tracks.get(&user.id).map(|track| FeedRow {
                    spotify_id: user.spotify_id.clone(),
                    display_name: user.display_name.clone(),
                    profile_pic_url: user.profile_pic_url.clone(),
                    track: track.clone(),
                })
            })
            .collect())
    }
}
