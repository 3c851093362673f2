use std::{sync::Arc, time::Duration};

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::{
    config::{ClientCredentials, RelayConfig},
    error::RelayError,
    model::{RawPlayback, TokenGrant},
};

///Trait abstracting the two provider calls the relay makes
#[rocket::async_trait]
pub trait PlaybackProvider {
    /// Exchange a long-lived refresh token for a fresh access token.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, RelayError>;

    /// Current playback of the token's owner; `None` when nothing is active.
    async fn fetch_playing(&self, access_token: &str) -> Result<Option<RawPlayback>, RelayError>;
}

/// Shared handle to whichever provider implementation is in use
pub type Provider = Arc<dyn PlaybackProvider + Send + Sync>;

pub struct SpotifyApi {
    http: Client,
    credentials: Option<ClientCredentials>,
    token_url: String,
    api_base_url: String,
}

impl SpotifyApi {
    pub fn new(config: &RelayConfig, timeout: Duration) -> Result<Self, RelayError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            credentials: config.client_credentials(),
            token_url: config.token_url.clone(),
            api_base_url: config.api_base_url.clone(),
        })
    }

    pub fn connect(config: &RelayConfig, timeout: Duration) -> Result<Provider, RelayError> {
        let api = Self::new(config, timeout)?;
        Ok(Arc::new(api))
    }
}

#[rocket::async_trait]
impl PlaybackProvider for SpotifyApi {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, RelayError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            RelayError::Configuration("SPOTIFY_CLIENT_ID or SPOTIFY_CLIENT_SECRET is not set".into())
        })?;

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&creds.id, Some(&creds.secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::ProviderAuth(format!(
                "token refresh returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let grant: TokenGrant = response.json().await?;
        debug!("refreshed access token, valid for {}s", grant.expires_in);
        Ok(grant)
    }

    async fn fetch_playing(&self, access_token: &str) -> Result<Option<RawPlayback>, RelayError> {
        let response = self
            .http
            .get(format!("{}/me/player/currently-playing", self.api_base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RelayError::ProviderApi {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
