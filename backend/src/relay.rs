use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use relay_core::types::Frame;
use tokio::sync::mpsc::{self, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    config::{RelayConfig, SessionTimings},
    credentials::TokenCache,
    error::RelayError,
    longpoll::SharedSnapshot,
    model::PlaybackSnapshot,
    normalize::normalize,
    provider::Provider,
    session,
};

/// Frames buffered per consumer before the session waits on the transport.
const FRAME_BUFFER: usize = 16;

/// Everything the consumer-facing endpoints share: the provider, the token
/// cache of the relay account and the long-poll comparison slot.
pub struct Relay {
    provider: Provider,
    tokens: TokenCache,
    has_client_credentials: bool,
    timings: SessionTimings,
    shared: SharedSnapshot,
    next_session_id: AtomicU64,
}

impl Relay {
    pub fn new(config: &RelayConfig, provider: Provider, timings: SessionTimings) -> Self {
        Self {
            tokens: TokenCache::new(provider.clone(), config.refresh_token.clone()),
            provider,
            has_client_credentials: config.client_credentials().is_some(),
            timings,
            shared: SharedSnapshot::default(),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn timings(&self) -> SessionTimings {
        self.timings
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn shared(&self) -> &SharedSnapshot {
        &self.shared
    }

    pub fn ensure_configured(&self) -> Result<(), RelayError> {
        if !self.has_client_credentials {
            return Err(RelayError::Configuration(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set".to_owned(),
            ));
        }
        if !self.tokens.has_refresh_token() {
            return Err(RelayError::Configuration(
                "MY_SPOTIFY_REFRESH_TOKEN must be set".to_owned(),
            ));
        }
        Ok(())
    }

    /// One poll: token, fetch, normalize.
    pub async fn current_snapshot(&self) -> Result<PlaybackSnapshot, RelayError> {
        let token = self.tokens.get_valid_token().await?;
        let raw = self.provider.fetch_playing(&token.value).await?;
        Ok(normalize(raw.as_ref()))
    }

    /// Starts a push session on its own task. Frames arrive on the returned
    /// receiver; cancelling the token (or dropping the receiver) ends it.
    pub fn open_session(self: &Arc<Self>) -> (Receiver<Frame>, CancellationToken) {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let cancel = CancellationToken::new();
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(
            session::run_session(self.clone(), tx, cancel.clone())
                .instrument(tracing::info_span!("session", id)),
        );

        (rx, cancel)
    }
}

#[cfg(test)]
pub mod testing {
    use std::time::Duration;

    use super::*;

    pub fn configured() -> RelayConfig {
        RelayConfig {
            client_id: Some("client".to_owned()),
            client_secret: Some("secret".to_owned()),
            refresh_token: Some("refresh".to_owned()),
            ..Default::default()
        }
    }

    pub fn short_timings() -> SessionTimings {
        SessionTimings {
            poll_interval: Duration::from_secs(2),
            stream_budget: Duration::from_secs(10),
            long_poll_budget: Duration::from_secs(9),
            upstream_timeout: Duration::from_secs(1),
        }
    }

    pub fn relay(config: &RelayConfig, provider: Provider) -> Arc<Relay> {
        Arc::new(Relay::new(config, provider, short_timings()))
    }
}
