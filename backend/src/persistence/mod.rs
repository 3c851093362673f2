use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use self::model::{ActiveShare, FeedRow, StoredToken, TrackRecord, User};

#[cfg(test)]
pub mod memory;
pub mod model;
pub mod pgsql;

///Trait abstracting storage requirements for the shared feed
#[rocket::async_trait]
pub trait PersistentStore {
    async fn create_tables(&self) -> Result<()>;
    async fn get_user_by_spotify_id(&self, spotify_id: &str) -> Result<Option<User>>;
    ///The first user ever created becomes the admin
    async fn create_user(
        &self,
        spotify_id: &str,
        display_name: &str,
        profile_pic_url: Option<&str>,
    ) -> Result<User>;
    async fn get_token_by_user(&self, user_id: i32) -> Result<Option<StoredToken>>;
    ///Insert or replace the token row of a user
    async fn update_token(
        &self,
        user_id: i32,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    ///Replaces any existing share of the user with one expiring in 24 hours
    async fn start_sharing(&self, user_id: i32) -> Result<ActiveShare>;
    async fn stop_sharing(&self, user_id: i32) -> Result<()>;
    ///Unexpired shares only
    async fn list_active_shares(&self) -> Result<Vec<ActiveShare>>;
    async fn upsert_track(&self, user_id: i32, track: &TrackRecord) -> Result<()>;
    async fn get_feed(&self) -> Result<Vec<FeedRow>>;
}

///Literally a Box<dyn PersistentStore + Send + Sync>
/// Using this type allows the database implementation to be
/// swapped at runtime
pub type Store = Arc<dyn PersistentStore + Send + Sync>;
