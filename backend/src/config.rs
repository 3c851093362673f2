use std::{env, time::Duration};

/// Default Spotify endpoints.
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Process configuration, read once at startup.
///
/// Everything is optional here: a missing value only matters to the feature
/// that needs it, and each feature reports its own absence.
#[derive(Clone, Debug, Default)]
pub struct RelayConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    /// Long-lived refresh token of the account the public stream follows.
    pub refresh_token: Option<String>,
    pub database_url: Option<String>,
    /// Shared secret gating the batch update task.
    pub cron_secret: Option<String>,
    /// Where the OAuth callback sends the user once the login completes.
    pub frontend_url: Option<String>,
    pub token_url: String,
    pub api_base_url: String,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self {
            client_id: var("SPOTIFY_CLIENT_ID"),
            client_secret: var("SPOTIFY_CLIENT_SECRET"),
            redirect_uri: var("SPOTIFY_REDIRECT_URI"),
            refresh_token: var("MY_SPOTIFY_REFRESH_TOKEN"),
            database_url: var("DATABASE_URL"),
            cron_secret: var("CRON_SECRET"),
            frontend_url: var("FRONTEND_URL"),
            token_url: SPOTIFY_TOKEN_URL.to_owned(),
            api_base_url: SPOTIFY_API_BASE_URL.to_owned(),
        }
    }

    pub fn client_credentials(&self) -> Option<ClientCredentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Some(ClientCredentials {
                id: id.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        }
    }
}

/// Empty variables count as unset.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Clone, Debug)]
pub struct ClientCredentials {
    pub id: String,
    pub secret: String,
}

/// Cadence and lifetime of relay sessions.
#[derive(Clone, Copy, Debug)]
pub struct SessionTimings {
    pub poll_interval: Duration,
    /// Lifetime of a push session (stream or socket) before it closes with a timeout.
    pub stream_budget: Duration,
    /// How long a bounded long-poll request waits for a change.
    pub long_poll_budget: Duration,
    /// Upper bound on every upstream HTTP call.
    pub upstream_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stream_budget: Duration::from_secs(890),
            long_poll_budget: Duration::from_secs(9),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}
