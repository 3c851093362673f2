use tokio::{
    sync::Mutex,
    time::{sleep_until, timeout_at, Instant},
};
use tracing::debug;

use crate::{error::RelayError, model::PlaybackSnapshot, relay::Relay};

/// Last snapshot handed to any long-poll caller. There is a single global
/// key: every caller compares against the same slot.
#[derive(Debug, Default)]
pub struct SharedSnapshot {
    last_returned: Mutex<Option<PlaybackSnapshot>>,
}

impl SharedSnapshot {
    /// Stores `snapshot` and returns true if it differs from the stored one.
    pub async fn replace_if_changed(&self, snapshot: &PlaybackSnapshot) -> bool {
        let mut last = self.last_returned.lock().await;
        if last.as_ref() == Some(snapshot) {
            return false;
        }
        *last = Some(snapshot.clone());
        true
    }

    pub async fn last(&self) -> Option<PlaybackSnapshot> {
        self.last_returned.lock().await.clone()
    }
}

/// Bounded variant of a push session for transports that cannot hold a
/// connection open.
///
/// Polls at the session interval and returns as soon as the snapshot differs
/// from the last one returned to any caller. When no further poll fits in the
/// long-poll budget the latest (unchanged) snapshot is returned, so callers
/// can re-request straight away. A provider call still running at the
/// deadline is abandoned in favour of the last snapshot handed out.
pub async fn wait_for_change(relay: &Relay) -> Result<PlaybackSnapshot, RelayError> {
    relay.ensure_configured()?;

    let timings = relay.timings();
    let deadline = Instant::now() + timings.long_poll_budget;

    loop {
        let snapshot = match timeout_at(deadline, relay.current_snapshot()).await {
            Ok(snapshot) => snapshot?,
            Err(_) => {
                debug!("long-poll budget spent inside a provider call");
                return relay
                    .shared()
                    .last()
                    .await
                    .ok_or(RelayError::ProviderTimeout(timings.long_poll_budget));
            }
        };
        if relay.shared().replace_if_changed(&snapshot).await {
            debug!("long-poll observed a change");
            return Ok(snapshot);
        }

        let next_poll = Instant::now() + timings.poll_interval;
        if next_poll > deadline {
            debug!("long-poll budget spent without a change");
            return Ok(snapshot);
        }
        sleep_until(next_poll.min(deadline)).await;
    }
}
