use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use rspotify::{prelude::*, AuthCodeSpotify, Credentials, OAuth};

use crate::{config::RelayConfig, error::RelayError};

/// Header the external scheduler must send to trigger the batch task.
pub const CRON_SECRET_HEADER: &str = "X-Cron-Secret";

/// Authorization-code login of feed users.
pub struct OAuthFlow {
    creds: Credentials,
    oauth: OAuth,
}

/// A user who just completed the login, with their fresh tokens.
#[derive(Clone, Debug)]
pub struct AuthorizedUser {
    pub spotify_id: String,
    pub display_name: String,
    pub profile_pic_url: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthFlow {
    pub fn from_config(config: &RelayConfig) -> Option<Self> {
        let creds = config.client_credentials()?;
        let redirect_uri = config.redirect_uri.clone()?;

        Some(Self {
            creds: Credentials::new(&creds.id, &creds.secret),
            oauth: OAuth {
                redirect_uri,
                scopes: scopes(),
                ..Default::default()
            },
        })
    }

    fn client(&self) -> AuthCodeSpotify {
        AuthCodeSpotify::new(self.creds.clone(), self.oauth.clone())
    }

    pub fn authorize_url(&self) -> Result<String, RelayError> {
        self.client()
            .get_authorize_url(false)
            .map_err(|err| RelayError::Configuration(format!("cannot build authorize url: {}", err)))
    }

    /// Exchanges the callback code for tokens and fetches the user's profile.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthorizedUser, RelayError> {
        let spotify = self.client();
        spotify
            .request_token(code)
            .await
            .map_err(|err| RelayError::ProviderAuth(format!("code exchange failed: {}", err)))?;

        let token = spotify
            .token
            .lock()
            .await
            .map_err(|_| RelayError::ProviderAuth("token store is unavailable".to_owned()))?
            .clone()
            .ok_or_else(|| RelayError::ProviderAuth("provider returned no token".to_owned()))?;

        let refresh_token = token
            .refresh_token
            .ok_or_else(|| RelayError::ProviderAuth("provider returned no refresh token".to_owned()))?;

        let profile = spotify
            .me()
            .await
            .map_err(|err| RelayError::ProviderAuth(format!("profile request failed: {}", err)))?;

        let spotify_id = profile.id.id().to_owned();
        Ok(AuthorizedUser {
            display_name: profile.display_name.unwrap_or_else(|| spotify_id.clone()),
            profile_pic_url: profile
                .images
                .and_then(|images| images.into_iter().next())
                .map(|image| image.url),
            spotify_id,
            access_token: token.access_token,
            refresh_token,
            expires_at: token
                .expires_at
                .unwrap_or_else(|| Utc::now() + token.expires_in),
        })
    }
}

/// Login configuration shared by the auth routes.
pub struct AuthState {
    pub flow: Option<OAuthFlow>,
    pub frontend_url: Option<String>,
}

impl AuthState {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            flow: OAuthFlow::from_config(config),
            frontend_url: config.frontend_url.clone(),
        }
    }

    pub fn flow(&self) -> Result<&OAuthFlow, RelayError> {
        self.flow.as_ref().ok_or_else(|| {
            RelayError::Configuration(
                "SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REDIRECT_URI must be set"
                    .to_owned(),
            )
        })
    }
}

/// Configured value of the batch task's shared secret.
pub struct CronSecret(pub Option<String>);

/// Request guard: the request carries the configured cron secret.
pub struct CronAuthorized;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronAuthorized {
    type Error = RelayError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let expected = match request.guard::<&State<CronSecret>>().await {
            Outcome::Success(secret) => secret.0.as_deref(),
            _ => None,
        };

        // an unset secret locks the task instead of opening it
        match (expected, request.headers().get_one(CRON_SECRET_HEADER)) {
            (Some(expected), Some(given)) if expected == given => Outcome::Success(CronAuthorized),
            _ => Outcome::Error((Status::Unauthorized, RelayError::Unauthorized)),
        }
    }
}

pub fn scopes() -> HashSet<String> {
    let scopes = ["user-read-currently-playing", "user-read-playback-state"];
    return HashSet::from(scopes.map(|s| s.to_owned()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_needs_redirect_uri() {
        let config = RelayConfig {
            client_id: Some("client".to_owned()),
            client_secret: Some("secret".to_owned()),
            ..Default::default()
        };
        assert!(OAuthFlow::from_config(&config).is_none());
        assert!(matches!(
            AuthState::from_config(&config).flow(),
            Err(RelayError::Configuration(_))
        ));
    }

    #[test]
    fn authorize_url_carries_client_and_scopes() {
        let config = RelayConfig {
            client_id: Some("client".to_owned()),
            client_secret: Some("secret".to_owned()),
            redirect_uri: Some("http://localhost:8090/api/auth/callback".to_owned()),
            ..Default::default()
        };
        let url = OAuthFlow::from_config(&config)
            .unwrap()
            .authorize_url()
            .unwrap();

        assert!(url.starts_with("https://accounts.spotify.com/authorize"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("user-read-currently-playing"));
    }
}
