use relay_core::types::{Frame, NowPlaying};
use tokio::{sync::mpsc::Sender, time::Instant};

use crate::model::PlaybackSnapshot;

/// Remembers the last snapshot a channel emitted.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_emitted: Option<PlaybackSnapshot>,
}

impl ChangeDetector {
    /// Returns true, and records `snapshot`, iff it differs from the last
    /// emitted one. The first snapshot is always emitted.
    pub fn maybe_emit(&mut self, snapshot: &PlaybackSnapshot) -> bool {
        if self.last_emitted.as_ref() == Some(snapshot) {
            return false;
        }
        self.last_emitted = Some(snapshot.clone());
        true
    }

    pub fn last_emitted(&self) -> Option<&PlaybackSnapshot> {
        self.last_emitted.as_ref()
    }
}

/// The consumer went away; the channel can no longer deliver frames.
#[derive(Debug, PartialEq, Eq)]
pub struct Disconnected;

/// One consumer's push channel.
pub struct ChannelSession {
    pub started_at: Instant,
    detector: ChangeDetector,
    consumer: Sender<Frame>,
}

impl ChannelSession {
    pub fn new(consumer: Sender<Frame>) -> Self {
        Self {
            started_at: Instant::now(),
            detector: ChangeDetector::default(),
            consumer,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.consumer.is_closed()
    }

    pub fn last_emitted(&self) -> Option<&PlaybackSnapshot> {
        self.detector.last_emitted()
    }

    /// Forwards `snapshot` to the consumer if it changed. Returns whether a
    /// frame was sent.
    pub async fn publish(&mut self, snapshot: &PlaybackSnapshot) -> Result<bool, Disconnected> {
        if !self.detector.maybe_emit(snapshot) {
            return Ok(false);
        }
        self.send(Frame::Snapshot(NowPlaying::from(snapshot))).await?;
        Ok(true)
    }

    pub async fn send(&self, frame: Frame) -> Result<(), Disconnected> {
        self.consumer.send(frame).await.map_err(|_| Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::normalize::normalize;
    use crate::provider::fake::playing;

    fn snapshot(title: &str) -> PlaybackSnapshot {
        normalize(playing(title).as_ref())
    }

    #[test]
    fn emits_only_on_change() {
        let a = snapshot("A");
        let b = snapshot("B");
        let sequence = [&a, &a, &b, &b, &a];

        let mut detector = ChangeDetector::default();
        let emitted: Vec<usize> = sequence
            .iter()
            .enumerate()
            .filter(|(_, snapshot)| detector.maybe_emit(snapshot))
            .map(|(index, _)| index)
            .collect();

        assert_eq!(emitted, vec![0, 2, 4]);
    }

    #[test]
    fn independently_built_snapshots_compare_equal() {
        let mut detector = ChangeDetector::default();
        assert!(detector.maybe_emit(&snapshot("Song")));
        assert!(!detector.maybe_emit(&snapshot("Song")));
    }

    #[test]
    fn progress_change_counts_as_change() {
        let mut detector = ChangeDetector::default();
        let mut moved = snapshot("Song");
        assert!(detector.maybe_emit(&moved));
        moved.progress_ms = Some(2000);
        assert!(detector.maybe_emit(&moved));
    }

    #[tokio::test]
    async fn publish_forwards_changed_snapshots() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut session = ChannelSession::new(tx);

        assert_eq!(session.publish(&snapshot("Song")).await, Ok(true));
        assert_eq!(session.publish(&snapshot("Song")).await, Ok(false));

        match rx.recv().await {
            Some(Frame::Snapshot(now_playing)) => {
                assert_eq!(now_playing.current_track, "Song by Artist")
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_reports_dropped_consumer() {
        let (tx, rx) = mpsc::channel(4);
        let mut session = ChannelSession::new(tx);
        drop(rx);

        assert!(session.is_disconnected());
        assert_eq!(session.publish(&snapshot("Song")).await, Err(Disconnected));
    }
}
