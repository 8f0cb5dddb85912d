//! Per-server playback session.
//!
//! Owns the queue, the playback modifiers and the advance cycle that picks the
//! next track whenever the sink goes idle. All mutable state sits behind one
//! mutex that is never held across an await or while a track hook runs, and
//! the `busy` flag is checked and set under that lock, so at most one advance
//! is in flight per session even on a multi-threaded runtime.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use jukebox_types::{ChannelId, PlaybackFlags, ServerId, SessionSnapshot, SinkStatus};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::display::format_duration;
use crate::events::EventBus;
use crate::resolver::{ResourceResolver, StreamHandle};
use crate::shuffle::{biased_insert_index, shuffle};
use crate::sink::{OutputSink, SinkEvent};
use crate::track::{Track, TrackError};
use crate::voice::{ConnectionEvent, VoiceConnection};

struct SessionState {
    queue: VecDeque<Arc<Track>>,
    /// Last track handed to the sink. Only "now playing" while the sink is
    /// not idle.
    current: Option<Arc<Track>>,
    /// Tracks handed to the sink that have not reached `Playing` yet, in the
    /// order they were played.
    pending_start: VecDeque<Arc<Track>>,
    flags: PlaybackFlags,
    busy: bool,
    just_skipped: bool,
    closed: bool,
    rng: StdRng,
}

impl SessionState {
    fn new(rng: StdRng) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            pending_start: VecDeque::new(),
            flags: PlaybackFlags::default(),
            busy: false,
            just_skipped: false,
            closed: false,
            rng,
        }
    }

    fn has_playable(&self) -> bool {
        !self.queue.is_empty()
            || (self.current.is_some() && (self.flags.looping || self.flags.repeat))
    }

    fn requeue(&mut self, track: Arc<Track>) {
        if self.flags.shuffle {
            let idx = biased_insert_index(self.queue.len(), &mut self.rng);
            self.queue.insert(idx, track);
        } else {
            self.queue.push_back(track);
        }
    }

    fn pick_next(&mut self) -> Option<Arc<Track>> {
        if self.flags.repeat && !self.just_skipped {
            if let Some(current) = self.current.as_ref() {
                current.disarm_start();
                return Some(current.clone());
            }
        }
        let mut next = self.queue.pop_front();
        if self.flags.looping {
            // The looped track now lives in the queue; a failed resolution of
            // `next` must not re-insert it a second time.
            if let Some(current) = self.current.take() {
                self.requeue(current);
            }
        }
        if next.is_none() {
            next = self.queue.pop_front();
        }
        next
    }

    fn is_current(&self, track: &Arc<Track>) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, track))
    }

    fn queued_secs(&self) -> u64 {
        self.queue.iter().map(|track| track.duration_secs()).sum()
    }
}

struct SessionInner {
    server: ServerId,
    state: Mutex<SessionState>,
    connection: Arc<dyn VoiceConnection>,
    sink: Arc<dyn OutputSink>,
    resolver: Arc<dyn ResourceResolver>,
    events: EventBus,
    shutdown: CancellationToken,
}

/// Playback state for one server. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Bind a session to an established voice connection.
    ///
    /// `shuffle_seed` fixes the random source; `None` seeds from entropy.
    pub fn new(
        server: ServerId,
        connection: Arc<dyn VoiceConnection>,
        resolver: Arc<dyn ResourceResolver>,
        events: EventBus,
        shuffle_seed: Option<u64>,
    ) -> Self {
        let rng = match shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sink = connection.sink();
        Self {
            inner: Arc::new(SessionInner {
                server,
                state: Mutex::new(SessionState::new(rng)),
                connection,
                sink,
                resolver,
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    pub fn server(&self) -> ServerId {
        self.inner.server
    }

    pub fn channel(&self) -> ChannelId {
        self.inner.connection.channel()
    }

    /// Whether both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Append a track and start it if nothing is playing.
    pub async fn enqueue(&self, track: impl Into<Arc<Track>>) {
        let track = track.into();
        tracing::debug!(server = %self.inner.server, title = track.title(), "enqueue");
        self.lock().queue.push_back(track);
        self.inner.events.queue_changed(self.inner.server);
        self.advance().await;
    }

    /// Put a track at the front of the queue and skip to it.
    pub async fn enqueue_front(&self, track: impl Into<Arc<Track>>) {
        let track = track.into();
        tracing::debug!(server = %self.inner.server, title = track.title(), "enqueue front");
        self.lock().queue.push_front(track);
        self.inner.events.queue_changed(self.inner.server);
        self.skip_one();
        self.advance().await;
    }

    /// Add a batch of tracks, shuffling the batch first when shuffle is on.
    ///
    /// With `at_front` the batch goes ahead of the existing queue and the
    /// current track is skipped.
    pub async fn enqueue_many(&self, tracks: Vec<Arc<Track>>, at_front: bool) {
        if tracks.is_empty() {
            return;
        }
        let count = tracks.len();
        {
            let mut state = self.lock();
            let mut batch = tracks;
            if state.flags.shuffle {
                shuffle(&mut batch, &mut state.rng);
            }
            if at_front {
                for track in batch.into_iter().rev() {
                    state.queue.push_front(track);
                }
            } else {
                state.queue.extend(batch);
            }
        }
        tracing::debug!(server = %self.inner.server, count, at_front, "enqueue batch");
        self.inner.events.queue_changed(self.inner.server);
        if at_front {
            self.skip_one();
        }
        self.advance().await;
    }

    /// Start the next track if the sink is idle and nothing else is starting one.
    ///
    /// Tracks that fail to resolve or start are reported through their error
    /// hook and skipped; the cycle then retries with the following track.
    pub async fn advance(&self) {
        loop {
            let (next, outgoing) = {
                let mut state = self.lock();
                if state.closed || state.busy || !self.inner.sink.status().is_idle() {
                    return;
                }
                if !state.has_playable() {
                    return;
                }
                state.busy = true;
                let outgoing = state.current.clone();
                let next = state.pick_next();
                state.just_skipped = false;
                match next {
                    Some(next) => (next, outgoing),
                    None => {
                        state.busy = false;
                        return;
                    }
                }
            };

            // The sink is idle, so whatever was loaded before is done.
            if let Some(outgoing) = outgoing {
                self.finish_track(&outgoing);
            }
            self.inner.events.queue_changed(self.inner.server);

            let outcome = match self.inner.resolver.resolve(next.source()).await {
                Ok(stream) => self.start(&next, stream),
                Err(err) => Err(err.into()),
            };
            match outcome {
                Ok(()) => return,
                Err(err) => self.fail(&next, err),
            }
        }
    }

    fn start(&self, next: &Arc<Track>, stream: StreamHandle) -> Result<(), TrackError> {
        {
            let mut state = self.lock();
            if state.closed {
                state.busy = false;
                return Ok(());
            }
            state.current = Some(next.clone());
            state.pending_start.push_back(next.clone());
        }
        let result = self.inner.sink.play(stream, next.gain());
        {
            let mut state = self.lock();
            state.busy = false;
            if result.is_err()
                && state
                    .pending_start
                    .back()
                    .is_some_and(|pending| Arc::ptr_eq(pending, next))
            {
                state.pending_start.pop_back();
            }
        }
        if result.is_ok() {
            tracing::info!(
                server = %self.inner.server,
                title = next.title(),
                volume = next.volume(),
                "playing track"
            );
        }
        result.map_err(TrackError::from)
    }

    fn fail(&self, track: &Arc<Track>, err: TrackError) {
        let message = err.to_string();
        tracing::warn!(
            server = %self.inner.server,
            title = track.title(),
            error = %message,
            "track could not be played; skipping"
        );
        {
            let mut state = self.lock();
            state.busy = false;
            if state.is_current(track) {
                state.current = None;
            }
        }
        track.notify_error(err);
        self.inner
            .events
            .track_failed(self.inner.server, track.title(), message);
    }

    fn finish_track(&self, track: &Track) {
        if track.notify_finish() {
            self.inner
                .events
                .track_finished(self.inner.server, track.title());
        }
    }

    /// Stop the current track; the idle transition advances to the next one.
    ///
    /// A skip issued while a track is still resolving reaches the sink before
    /// that track starts, so it does not cancel the pending track.
    pub fn skip_one(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.just_skipped = true;
        }
        self.inner.sink.stop(true);
    }

    /// Skip the current track and drop the next `count - 1` queued ones.
    ///
    /// Returns the number of queued entries removed.
    pub fn skip_count(&self, count: usize) -> usize {
        let removed = {
            let mut state = self.lock();
            let n = count.saturating_sub(1).min(state.queue.len());
            state.queue.drain(..n);
            n
        };
        if removed > 0 {
            self.inner.events.queue_changed(self.inner.server);
        }
        self.skip_one();
        removed
    }

    /// Remove queue positions `lo..=hi` (1-based; position 0 is the current
    /// track). A range that starts at 0 also skips the current track.
    pub fn skip_range(&self, lo: usize, hi: usize) -> usize {
        if lo == 0 {
            return self.skip_count(hi.saturating_add(1));
        }
        let removed = {
            let mut state = self.lock();
            let hi = hi.min(state.queue.len());
            if lo > hi {
                0
            } else {
                state.queue.drain(lo - 1..hi);
                hi - lo + 1
            }
        };
        if removed > 0 {
            self.inner.events.queue_changed(self.inner.server);
        }
        removed
    }

    /// Clear the queue and stop playback. Returns `false` if there was nothing
    /// to stop.
    pub fn stop_all(&self) -> bool {
        let (had_queue, outgoing) = {
            let mut state = self.lock();
            let had_queue = !state.queue.is_empty();
            state.queue.clear();
            (had_queue, state.current.take())
        };
        let stopped = self.inner.sink.stop(true);
        if let Some(outgoing) = outgoing {
            self.finish_track(&outgoing);
        }
        if had_queue {
            self.inner.events.queue_changed(self.inner.server);
        }
        had_queue || stopped
    }

    pub fn pause(&self) -> bool {
        self.inner.sink.pause()
    }

    pub fn unpause(&self) -> bool {
        self.inner.sink.unpause()
    }

    /// Returns whether the flag changed.
    pub fn set_repeat(&self, on: bool) -> bool {
        self.update_flags(|flags, _, _| std::mem::replace(&mut flags.repeat, on) != on)
    }

    /// Returns whether the flag changed.
    pub fn set_loop(&self, on: bool) -> bool {
        self.update_flags(|flags, _, _| std::mem::replace(&mut flags.looping, on) != on)
    }

    /// Turning shuffle on always reshuffles the queue and returns `true`.
    /// Turning it off returns whether it was on.
    pub fn set_shuffle(&self, on: bool) -> bool {
        self.update_flags(|flags, queue, rng| {
            let was_on = std::mem::replace(&mut flags.shuffle, on);
            if on {
                shuffle(queue.make_contiguous(), rng);
                true
            } else {
                was_on
            }
        })
    }

    fn update_flags<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut PlaybackFlags, &mut VecDeque<Arc<Track>>, &mut StdRng) -> bool,
    {
        let (changed, flags) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let changed = update(&mut state.flags, &mut state.queue, &mut state.rng);
            (changed, state.flags)
        };
        if changed {
            tracing::info!(
                server = %self.inner.server,
                repeat = flags.repeat,
                looping = flags.looping,
                shuffle = flags.shuffle,
                "playback flags changed"
            );
            self.inner.events.flags_changed(self.inner.server, flags);
        }
        changed
    }

    pub fn flags(&self) -> PlaybackFlags {
        self.lock().flags
    }

    pub fn queue(&self) -> Vec<Arc<Track>> {
        self.lock().queue.iter().cloned().collect()
    }

    /// The track playing right now, if the sink is not idle.
    pub fn now_playing(&self) -> Option<Arc<Track>> {
        if self.inner.sink.status().is_idle() {
            return None;
        }
        self.lock().current.clone()
    }

    /// Sum of queued track durations as `H:MM:SS`.
    pub fn total_queued_duration(&self) -> String {
        format_duration(self.lock().queued_secs())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let sink_status = self.inner.sink.status();
        let state = self.lock();
        let current = if sink_status.is_idle() {
            None
        } else {
            state.current.as_ref().map(|track| track.summary())
        };
        SessionSnapshot {
            server: self.inner.server,
            current,
            queue: state.queue.iter().map(|track| track.summary()).collect(),
            flags: state.flags,
            sink_status,
            queued_duration: format_duration(state.queued_secs()),
        }
    }

    /// Clear everything, stop the sink and tear down the voice connection.
    pub fn destroy(&self) {
        let outgoing = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.clear();
            state.pending_start.clear();
            state.current.take()
        };
        self.inner.shutdown.cancel();
        self.inner.sink.stop(true);
        self.inner.connection.destroy();
        if let Some(outgoing) = outgoing {
            self.finish_track(&outgoing);
        }
        tracing::info!(server = %self.inner.server, "session closed");
        self.inner.events.session_closed(self.inner.server);
    }

    /// Drive the advance cycle from sink transitions until the session closes.
    pub fn spawn_driver(&self) -> JoinHandle<()> {
        let mut events = self.inner.sink.subscribe();
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.inner.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => session.on_sink_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                server = %session.inner.server,
                                skipped,
                                "sink events lagged"
                            );
                            session.resync_pending_start();
                            session.on_idle().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!(server = %session.inner.server, "sink driver stopped");
        })
    }

    async fn on_sink_event(&self, event: SinkEvent) {
        match (event.from, event.to) {
            (SinkStatus::Paused, SinkStatus::Playing) => {}
            (_, SinkStatus::Playing) => {
                let started = self.lock().pending_start.pop_front();
                if let Some(track) = started {
                    self.start_track(&track);
                }
            }
            (SinkStatus::Buffering, SinkStatus::Idle) => {
                // Stopped before it ever played.
                self.lock().pending_start.pop_front();
                self.on_idle().await;
            }
            (from, SinkStatus::Idle) if !from.is_idle() => self.on_idle().await,
            _ => {}
        }
    }

    fn start_track(&self, track: &Track) {
        if track.notify_start() {
            self.inner
                .events
                .track_started(self.inner.server, track.title());
        }
    }

    /// Rebuild the pending starts from the sink status after dropped events.
    fn resync_pending_start(&self) {
        let status = self.inner.sink.status();
        let started = {
            let mut state = self.lock();
            let latest = state.pending_start.pop_back();
            state.pending_start.clear();
            match (status, latest) {
                (SinkStatus::Buffering, Some(track)) => {
                    state.pending_start.push_back(track);
                    None
                }
                (SinkStatus::Playing | SinkStatus::Paused, latest) => latest,
                _ => None,
            }
        };
        if let Some(track) = started {
            self.start_track(&track);
        }
    }

    async fn on_idle(&self) {
        // Stale transition: a new track already started.
        if !self.inner.sink.status().is_idle() {
            return;
        }
        let current = self.lock().current.clone();
        if let Some(track) = current {
            self.finish_track(&track);
        }
        self.advance().await;
    }

    /// Destroy the session when the voice connection is lost for good.
    ///
    /// `on_lost` runs once, after the session is destroyed.
    pub fn spawn_connection_watcher<F>(&self, on_lost: F) -> JoinHandle<()>
    where
        F: FnOnce(ServerId) + Send + 'static,
    {
        let mut events = self.inner.connection.subscribe();
        let session = self.clone();
        tokio::spawn(async move {
            let server = session.inner.server;
            loop {
                tokio::select! {
                    _ = session.inner.shutdown.cancelled() => return,
                    event = events.recv() => match event {
                        Ok(ConnectionEvent::Reconnecting { attempt }) => {
                            tracing::info!(server = %server, attempt, "voice reconnecting");
                        }
                        Ok(ConnectionEvent::Reconnected) => {
                            tracing::info!(server = %server, "voice reconnected");
                        }
                        Ok(ConnectionEvent::Lost) | Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {}
                    },
                }
            }
            tracing::warn!(server = %server, "voice connection lost");
            session.destroy();
            on_lost(server);
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.inner.server)
            .finish_non_exhaustive()
    }
}
