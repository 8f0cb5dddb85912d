//! Simulated output sink that plays each stream for its duration in wall-clock time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use jukebox_core::{OutputSink, SinkError, SinkEvent, SinkState, StreamHandle};
use jukebox_types::SinkStatus;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Play time for streams whose duration could not be determined.
pub(crate) const DEFAULT_TRACK_DURATION: Duration = Duration::from_secs(3);
const BUFFER_DELAY: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Playback {
    /// Bumped on every state change; timers from older generations are ignored.
    generation: u64,
    remaining: Duration,
    started: Option<Instant>,
    gain: f32,
}

struct ClockInner {
    state: SinkState,
    playback: Mutex<Playback>,
}

impl ClockInner {
    fn playback(&self) -> MutexGuard<'_, Playback> {
        self.playback.lock().unwrap_or_else(|err| err.into_inner())
    }
}

pub(crate) struct ClockSink {
    inner: Arc<ClockInner>,
}

impl ClockSink {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ClockInner {
                state: SinkState::new(),
                playback: Mutex::new(Playback::default()),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn gain(&self) -> f32 {
        self.inner.playback().gain
    }

    fn spawn_finish_timer(inner: Arc<ClockInner>, generation: u64, after: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let current = inner.playback().generation == generation;
            if current && inner.state.transition_if(SinkStatus::Playing, SinkStatus::Idle) {
                tracing::debug!("clock sink finished stream");
            }
        });
    }
}

impl OutputSink for ClockSink {
    fn play(&self, stream: StreamHandle, gain: f32) -> Result<(), SinkError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SinkError::Offline);
        }
        let length = stream.duration.unwrap_or(DEFAULT_TRACK_DURATION);
        let generation = {
            let mut playback = self.inner.playback();
            playback.generation += 1;
            playback.remaining = length;
            playback.started = None;
            playback.gain = gain;
            playback.generation
        };
        tracing::debug!(
            source = %stream.source,
            ext = %stream.ext_hint,
            length_ms = length.as_millis() as u64,
            gain,
            "clock sink play"
        );
        self.inner.state.transition(SinkStatus::Buffering);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(BUFFER_DELAY).await;
            {
                let mut playback = inner.playback();
                if playback.generation != generation {
                    return;
                }
                playback.started = Some(Instant::now());
            }
            if inner
                .state
                .transition_if(SinkStatus::Buffering, SinkStatus::Playing)
            {
                ClockSink::spawn_finish_timer(inner, generation, length);
            }
        });
        Ok(())
    }

    fn pause(&self) -> bool {
        let mut playback = self.inner.playback();
        if !self
            .inner
            .state
            .transition_if(SinkStatus::Playing, SinkStatus::Paused)
        {
            return false;
        }
        playback.generation += 1;
        let elapsed = playback
            .started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        playback.remaining = playback.remaining.saturating_sub(elapsed);
        true
    }

    fn unpause(&self) -> bool {
        let (generation, remaining) = {
            let mut playback = self.inner.playback();
            if !self
                .inner
                .state
                .transition_if(SinkStatus::Paused, SinkStatus::Playing)
            {
                return false;
            }
            playback.generation += 1;
            playback.started = Some(Instant::now());
            (playback.generation, playback.remaining)
        };
        ClockSink::spawn_finish_timer(self.inner.clone(), generation, remaining);
        true
    }

    fn stop(&self, force: bool) -> bool {
        let mut playback = self.inner.playback();
        if !force && self.inner.state.get() == SinkStatus::Buffering {
            return false;
        }
        playback.generation += 1;
        playback.started = None;
        playback.remaining = Duration::ZERO;
        drop(playback);
        !self.inner.state.transition(SinkStatus::Idle).is_idle()
    }

    fn status(&self) -> SinkStatus {
        self.inner.state.get()
    }

    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.inner.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jukebox_core::SourceRef;

    fn stream(secs: Option<u64>) -> StreamHandle {
        StreamHandle::new(SourceRef::parse("/music/a.ogg").expect("source"))
            .with_duration(secs.map(Duration::from_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn plays_for_stream_duration() {
        let sink = ClockSink::new();
        let mut events = sink.subscribe();

        sink.play(stream(Some(2)), 0.5).expect("play");
        assert_eq!(sink.status(), SinkStatus::Buffering);
        assert_eq!(sink.gain(), 0.5);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.status(), SinkStatus::Playing);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sink.status(), SinkStatus::Playing);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.status(), SinkStatus::Idle);

        let seen: Vec<SinkStatus> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.to)
            .collect();
        assert_eq!(
            seen,
            vec![SinkStatus::Buffering, SinkStatus::Playing, SinkStatus::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_duration_uses_default() {
        let sink = ClockSink::new();
        sink.play(stream(None), 1.0).expect("play");
        tokio::time::sleep(DEFAULT_TRACK_DURATION).await;
        assert_eq!(sink.status(), SinkStatus::Playing);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.status(), SinkStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_remaining_time() {
        let sink = ClockSink::new();
        assert!(!sink.pause());
        sink.play(stream(Some(2)), 1.0).expect("play");
        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert!(sink.pause());
        assert!(!sink.pause());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.status(), SinkStatus::Paused);

        assert!(sink.unpause());
        assert!(!sink.unpause());
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(sink.status(), SinkStatus::Playing);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.status(), SinkStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_timers() {
        let sink = ClockSink::new();
        assert!(!sink.stop(true));

        sink.play(stream(Some(1)), 1.0).expect("play");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(sink.stop(true));
        assert_eq!(sink.status(), SinkStatus::Idle);

        // A new stream is not cut short by the old finish timer.
        sink.play(stream(Some(2)), 1.0).expect("play");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sink.status(), SinkStatus::Playing);
    }

    #[test]
    fn play_outside_runtime_is_offline() {
        let sink = ClockSink::new();
        assert!(matches!(
            sink.play(stream(Some(1)), 1.0),
            Err(SinkError::Offline)
        ));
    }
}
