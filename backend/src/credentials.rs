use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{error::RelayError, model::TokenGrant, provider::Provider};

/// Access tokens are treated as expired this long before the provider says so.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    /// Provider expiry minus the safety margin.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn from_grant(grant: &TokenGrant, now: DateTime<Utc>) -> Result<Self, RelayError> {
        Ok(Self {
            value: grant.access_token.clone(),
            expires_at: expiry_after(now, grant.expires_in.saturating_sub(EXPIRY_MARGIN_SECS))?,
        })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// `now + secs`, rejecting lifetimes chrono cannot represent.
pub fn expiry_after(now: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>, RelayError> {
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| RelayError::ProviderAuth(format!("unusable token lifetime of {}s", secs)))
}

/// Process-wide cache of the relay account's access token.
///
/// Valid tokens are served under a read lock. Refreshes go through
/// `refresh_gate` so that concurrent callers hitting an expired token cause a
/// single call to the provider; everyone queued behind it re-checks the cache
/// first.
pub struct TokenCache {
    provider: Provider,
    refresh_token: Option<String>,
    current: RwLock<Option<AccessToken>>,
    refresh_gate: Mutex<()>,
}

impl TokenCache {
    pub fn new(provider: Provider, refresh_token: Option<String>) -> Self {
        Self {
            provider,
            refresh_token,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub async fn get_valid_token(&self) -> Result<AccessToken, RelayError> {
        self.get_valid_token_at(Utc::now()).await
    }

    pub async fn get_valid_token_at(&self, now: DateTime<Utc>) -> Result<AccessToken, RelayError> {
        if let Some(token) = self.cached(now).await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;

        // another caller may have refreshed while we waited
        if let Some(token) = self.cached(now).await {
            debug!("reusing token refreshed by a concurrent caller");
            return Ok(token);
        }

        let refresh_token = self.refresh_token.as_deref().ok_or_else(|| {
            RelayError::ProviderAuth("MY_SPOTIFY_REFRESH_TOKEN is not set".to_owned())
        })?;

        let grant = self.provider.refresh_access_token(refresh_token).await?;
        let token = AccessToken::from_grant(&grant, now)?;
        info!("cached new access token, expires at {}", token.expires_at);

        *self.current.write().await = Some(token.clone());
        Ok(token)
    }

    async fn cached(&self, now: DateTime<Utc>) -> Option<AccessToken> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }
}
