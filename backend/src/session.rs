use std::{fmt, sync::Arc};

use relay_core::types::Frame;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::RelayError,
    publisher::{ChannelSession, Disconnected},
    relay::Relay,
};

/// How a push session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The consumer went away. Not an error.
    Disconnected,
    /// The session budget ran out; the consumer is expected to reconnect.
    TimedOut,
    /// A terminal error frame was sent.
    Failed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Disconnected => f.write_str("closed by consumer"),
            SessionEnd::TimedOut => f.write_str("closed after session budget"),
            SessionEnd::Failed => f.write_str("closed on error"),
        }
    }
}

enum Interrupt {
    Disconnected,
    Failed(RelayError),
}

impl From<Disconnected> for Interrupt {
    fn from(_: Disconnected) -> Self {
        Interrupt::Disconnected
    }
}

impl From<RelayError> for Interrupt {
    fn from(err: RelayError) -> Self {
        Interrupt::Failed(err)
    }
}

/// Drives one consumer's push channel until it disconnects, times out or
/// fails.
///
/// Polls are strictly sequential. Both the poll and the sleep between polls
/// race `cancel`, so a disconnect is honoured without waiting for the
/// provider or the next tick.
pub async fn run_session(
    relay: Arc<Relay>,
    consumer: Sender<Frame>,
    cancel: CancellationToken,
) -> SessionEnd {
    let mut session = ChannelSession::new(consumer);

    let end = match connect(&relay, &session).await {
        Ok(()) => stream(&relay, &mut session, &cancel).await,
        Err(end) => end,
    };

    info!(
        "session {} after {}s, last sent: {}",
        end,
        session.started_at.elapsed().as_secs(),
        session
            .last_emitted()
            .map_or("nothing".to_owned(), |snapshot| snapshot.display_line())
    );
    end
}

async fn connect(relay: &Relay, session: &ChannelSession) -> Result<(), SessionEnd> {
    if let Err(err) = relay.ensure_configured() {
        warn!("refusing session: {}", err);
        // the consumer may already be gone; the session ends either way
        let _ = session.send(Frame::Error(err.frame())).await;
        return Err(SessionEnd::Failed);
    }
    debug!("session streaming");
    Ok(())
}

async fn stream(
    relay: &Relay,
    session: &mut ChannelSession,
    cancel: &CancellationToken,
) -> SessionEnd {
    let timings = relay.timings();

    loop {
        if cancel.is_cancelled() || session.is_disconnected() {
            return SessionEnd::Disconnected;
        }
        if session.started_at.elapsed() >= timings.stream_budget {
            return SessionEnd::TimedOut;
        }

        let cycle = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Disconnected,
            cycle = poll_and_publish(relay, session) => cycle,
        };

        match cycle {
            Ok(emitted) => debug!("poll complete, emitted: {}", emitted),
            Err(Interrupt::Disconnected) => return SessionEnd::Disconnected,
            Err(Interrupt::Failed(err)) => {
                error!("poll failed, closing session: {}", err);
                let _ = session.send(Frame::Error(err.frame())).await;
                return SessionEnd::Failed;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Disconnected,
            _ = tokio::time::sleep(timings.poll_interval) => {}
        }
    }
}

async fn poll_and_publish(relay: &Relay, session: &mut ChannelSession) -> Result<bool, Interrupt> {
    let snapshot = relay.current_snapshot().await?;
    Ok(session.publish(&snapshot).await?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_core::types::ErrorFrame;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::RelayConfig,
        provider::fake::{playing, FakeProvider},
        relay::testing,
    };

    fn titles(frames: &[Frame]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| match frame {
                Frame::Snapshot(now_playing) => now_playing.current_track.clone(),
                Frame::Error(err) => format!("error:{}", err.error),
            })
            .collect()
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_before_first_poll_emits_nothing() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_playback(playing("Song"));
        let relay = testing::relay(&testing::configured(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let end = run_session(relay, tx, cancel).await;

        assert_eq!(end, SessionEnd::Disconnected);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(provider.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_configuration_sends_one_error_and_never_polls() {
        let provider = Arc::new(FakeProvider::new());
        let relay = testing::relay(&RelayConfig::default(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let end = run_session(relay, tx, CancellationToken::new()).await;

        assert_eq!(end, SessionEnd::Failed);
        assert_eq!(
            titles(&drain(&mut rx)),
            vec![format!("error:{}", ErrorFrame::SERVER_MISCONFIGURED)]
        );
        assert_eq!(provider.fetch_count(), 0);
        assert_eq!(provider.refresh_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_changes_then_times_out() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_playback(playing("A"));
        provider.push_playback(playing("A"));
        provider.push_playback(playing("B"));
        let relay = testing::relay(&testing::configured(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let end = run_session(relay, tx, CancellationToken::new()).await;

        assert_eq!(end, SessionEnd::TimedOut);
        assert_eq!(titles(&drain(&mut rx)), vec!["A by Artist", "B by Artist"]);
        // polls at 0, 2, 4, 6 and 8 seconds of a 10 second budget
        assert_eq!(provider.fetch_count(), 5);
        assert_eq!(provider.refresh_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_sends_error_frame_and_stops() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_playback(playing("A"));
        provider.push_failure(500, "boom");
        let relay = testing::relay(&testing::configured(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let end = run_session(relay, tx, CancellationToken::new()).await;

        assert_eq!(end, SessionEnd::Failed);
        assert_eq!(
            titles(&drain(&mut rx)),
            vec![
                "A by Artist".to_owned(),
                format!("error:{}", ErrorFrame::PROVIDER_API_ERROR)
            ]
        );
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_refresh_surfaces_auth_error() {
        let provider = Arc::new(FakeProvider::new().rejecting_refresh());
        let relay = testing::relay(&testing::configured(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let end = run_session(relay, tx, CancellationToken::new()).await;

        assert_eq!(end, SessionEnd::Failed);
        assert_eq!(
            titles(&drain(&mut rx)),
            vec![format!("error:{}", ErrorFrame::PROVIDER_AUTH_FAILED)]
        );
        assert_eq!(provider.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_consumer_ends_session_at_next_tick() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_playback(playing("A"));
        let relay = testing::relay(&testing::configured(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let handle = tokio::spawn(run_session(relay, tx, CancellationToken::new()));
        assert!(rx.recv().await.is_some());
        drop(rx);

        assert_eq!(handle.await.unwrap(), SessionEnd::Disconnected);
        assert!(provider.fetch_count() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_playback(playing("A"));
        let relay = testing::relay(&testing::configured(), provider.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_session(relay, tx, cancel.clone()));
        assert!(rx.recv().await.is_some());
        cancel.cancel();

        let started = tokio::time::Instant::now();
        assert_eq!(handle.await.unwrap(), SessionEnd::Disconnected);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(provider.fetch_count(), 1);
    }
}
