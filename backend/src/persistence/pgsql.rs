use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use super::{
    model::{ActiveShare, FeedRow, StoredToken, TrackRecord, User},
    PersistentStore, Store,
};

macro_rules! create_table {
    ($query:expr, $executor:expr) => {{
        let res = sqlx::query($query).execute($executor).await;
        if let Err(e) = &res {
            tracing::error!("failed to run {}: {}", stringify!($query), e);
        } else {
            tracing::debug!("successfully ran {}", stringify!($query));
        }
        res
    }};
}

pub struct PostgresDatabase {
    pool: Pool<Postgres>,
}

impl PostgresDatabase {
    async fn new(database_url: &str) -> Result<Self> {
        let conn_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool: conn_pool })
    }

    pub async fn connect(database_url: &str) -> Result<Store> {
        let db = Self::new(database_url).await?;
        Ok(Arc::new(db))
    }
}

#[rocket::async_trait]
impl PersistentStore for PostgresDatabase {
    async fn create_tables(&self) -> Result<()> {
        create_table!(queries::CREATE_USERS_TABLE, &self.pool)?;
        create_table!(queries::CREATE_TOKENS_TABLE, &self.pool)?;
        create_table!(queries::CREATE_ACTIVE_SHARES_TABLE, &self.pool)?;
        create_table!(queries::CREATE_TRACKS_TABLE, &self.pool)?;

        Ok(())
    }

    async fn get_user_by_spotify_id(&self, spotify_id: &str) -> Result<Option<User>> {
        const QUERY: &str = "
            SELECT id, spotify_id, display_name, profile_pic_url, is_admin
            FROM users
            WHERE spotify_id = $1;";

        let user = sqlx::query_as::<_, User>(QUERY)
            .bind(spotify_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_user(
        &self,
        spotify_id: &str,
        display_name: &str,
        profile_pic_url: Option<&str>,
    ) -> Result<User> {
        const INSERT_USER_QUERY: &str = "
            INSERT INTO users (spotify_id, display_name, profile_pic_url, is_admin)
                VALUES ($1, $2, $3, NOT EXISTS (SELECT 1 FROM users))
            RETURNING id, spotify_id, display_name, profile_pic_url, is_admin;
        ";

        let user = sqlx::query_as::<_, User>(INSERT_USER_QUERY)
            .bind(spotify_id)
            .bind(display_name)
            .bind(profile_pic_url)
            .fetch_one(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_token_by_user(&self, user_id: i32) -> Result<Option<StoredToken>> {
        const QUERY: &str = "
            SELECT user_id, access_token, refresh_token, expires_at
            FROM tokens
            WHERE user_id = $1;";

        let token = sqlx::query_as::<_, StoredToken>(QUERY)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(token)
    }

    async fn update_token(
        &self,
        user_id: i32,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        const UPSERT_TOKEN_QUERY: &str = "
            INSERT INTO tokens (user_id, access_token, refresh_token, expires_at)
                VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at;
        ";

        sqlx::query(UPSERT_TOKEN_QUERY)
            .bind(user_id)
            .bind(access_token)
            .bind(refresh_token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn start_sharing(&self, user_id: i32) -> Result<ActiveShare> {
        const DELETE_SHARE_QUERY: &str = "DELETE FROM active_shares WHERE user_id = $1;";
        const INSERT_SHARE_QUERY: &str = "
            INSERT INTO active_shares (user_id, expires_at)
                VALUES ($1, $2);
        ";

        let share = ActiveShare::starting_at(user_id, Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(DELETE_SHARE_QUERY)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(INSERT_SHARE_QUERY)
            .bind(share.user_id)
            .bind(share.expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(share)
    }

    async fn stop_sharing(&self, user_id: i32) -> Result<()> {
        sqlx::query("DELETE FROM active_shares WHERE user_id = $1;")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_active_shares(&self) -> Result<Vec<ActiveShare>> {
        const QUERY: &str = "
            SELECT user_id, expires_at
            FROM active_shares
            WHERE expires_at > $1
            ORDER BY user_id;";

        let shares = sqlx::query_as::<_, ActiveShare>(QUERY)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await?;

        Ok(shares)
    }

    async fn upsert_track(&self, user_id: i32, track: &TrackRecord) -> Result<()> {
        const UPSERT_TRACK_QUERY: &str = "
            INSERT INTO tracks (user_id, track_name, artist_name, album_cover_url,
                                spotify_track_url, currently_playing)
                VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                track_name = EXCLUDED.track_name,
                artist_name = EXCLUDED.artist_name,
                album_cover_url = EXCLUDED.album_cover_url,
                spotify_track_url = EXCLUDED.spotify_track_url,
                currently_playing = EXCLUDED.currently_playing;
        ";

        sqlx::query(UPSERT_TRACK_QUERY)
            .bind(user_id)
            .bind(&track.track_name)
            .bind(&track.artist_name)
            .bind(&track.album_cover_url)
            .bind(&track.spotify_track_url)
            .bind(track.currently_playing)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_feed(&self) -> Result<Vec<FeedRow>> {
        const QUERY: &str = "
            SELECT
                users.spotify_id            AS spotify_id,
                users.display_name          AS display_name,
                users.profile_pic_url       AS profile_pic_url,
                tracks.track_name           AS track_name,
                tracks.artist_name          AS artist_name,
                tracks.album_cover_url      AS album_cover_url,
                tracks.spotify_track_url    AS spotify_track_url,
                tracks.currently_playing    AS currently_playing
            FROM active_shares
            JOIN users ON active_shares.user_id = users.id
            JOIN tracks ON tracks.user_id = users.id
            WHERE active_shares.expires_at > $1
            ORDER BY users.id;";

        let rows = sqlx::query_as::<_, FeedRow>(QUERY)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

mod queries {
    pub const CREATE_USERS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        spotify_id text UNIQUE NOT NULL,
        display_name text NOT NULL,
        profile_pic_url text,
        is_admin boolean NOT NULL DEFAULT false
    );
";

    pub const CREATE_TOKENS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS tokens (
        id SERIAL PRIMARY KEY,
        user_id integer UNIQUE NOT NULL REFERENCES users (id),
        access_token text NOT NULL,
        refresh_token text NOT NULL,
        expires_at timestamptz NOT NULL
    );
";

    pub const CREATE_ACTIVE_SHARES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS active_shares (
        id SERIAL PRIMARY KEY,
        user_id integer UNIQUE NOT NULL REFERENCES users (id),
        expires_at timestamptz NOT NULL
    );
";

    pub const CREATE_TRACKS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS tracks (
        id SERIAL PRIMARY KEY,
        user_id integer UNIQUE NOT NULL REFERENCES users (id),
        track_name text NOT NULL,
        artist_name text NOT NULL,
        album_cover_url text NOT NULL,
        spotify_track_url text NOT NULL,
        currently_playing boolean NOT NULL
    );
";
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    async fn setup_db() -> PostgresDatabase {
        let url = env::var("DATABASE_URL").unwrap();
        let db = PostgresDatabase::new(&url).await.unwrap();
        db.create_tables().await.unwrap();
        db
    }

    async fn teardown_db(db: PostgresDatabase) {
        const DROP_SCHEMA: &str = "DROP SCHEMA public CASCADE;";
        const RECREATE_SCHEMA: &str = "CREATE SCHEMA public;";
        const GRANT_TO_PUBLIC: &str = "GRANT ALL ON SCHEMA public TO public;";

        sqlx::query(DROP_SCHEMA).execute(&db.pool).await.unwrap();
        sqlx::query(RECREATE_SCHEMA)
            .execute(&db.pool)
            .await
            .unwrap();

        sqlx::query(GRANT_TO_PUBLIC)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a postgres instance at DATABASE_URL"]
    async fn test_share_and_feed_roundtrip() -> Result<()> {
        let db = setup_db().await;

        let first = db.create_user("abcde", "Example User", None).await?;
        let second = db.create_user("fghij", "Other User", None).await?;
        assert!(first.is_admin);
        assert!(!second.is_admin);

        db.start_sharing(first.id).await?;
        db.start_sharing(first.id).await?;
        db.upsert_track(
            first.id,
            &TrackRecord {
                track_name: "Example Song".to_owned(),
                artist_name: "Example Artist".to_owned(),
                album_cover_url: "http://fake-album-cover.com/image.jpg".to_owned(),
                spotify_track_url: "http://fake-link.com".to_owned(),
                currently_playing: true,
            },
        )
        .await?;

        assert_eq!(db.list_active_shares().await?.len(), 1);
        let feed = db.get_feed().await?;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].track.track_name, "Example Song");

        db.stop_sharing(first.id).await?;
        assert!(db.get_feed().await?.is_empty());

        teardown_db(db).await;

        Ok(())
    }
}
