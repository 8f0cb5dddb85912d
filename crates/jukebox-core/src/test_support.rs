//! Mock collaborators shared by the unit tests in this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jukebox_types::{ChannelId, ServerId, SinkStatus};
use tokio::sync::{Notify, broadcast};

use crate::resolver::{ResolveError, ResourceResolver, StreamHandle};
use crate::sink::{OutputSink, SinkError, SinkEvent, SinkState};
use crate::track::{MediaInfo, SourceRef, Track, TrackHooks};
use crate::voice::{ConnectionEvent, VoiceConnection, VoiceError, VoiceGateway};

/// Sink that becomes `Playing` as soon as a stream is handed over and stays
/// there until the test calls [`MockSink::finish`].
///
/// With `hold_buffering` set, streams stop at `Buffering` until
/// [`MockSink::begin_playback`].
pub(crate) struct MockSink {
    pub(crate) state: SinkState,
    pub(crate) plays: Mutex<Vec<(StreamHandle, f32)>>,
    pub(crate) reject_plays: AtomicBool,
    pub(crate) hold_buffering: AtomicBool,
}

impl MockSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: SinkState::new(),
            plays: Mutex::new(Vec::new()),
            reject_plays: AtomicBool::new(false),
            hold_buffering: AtomicBool::new(false),
        })
    }

    /// Simulate the end of the current stream.
    pub(crate) fn finish(&self) {
        self.state.transition(SinkStatus::Idle);
    }

    pub(crate) fn begin_playback(&self) -> bool {
        self.state
            .transition_if(SinkStatus::Buffering, SinkStatus::Playing)
    }

    pub(crate) fn played_sources(&self) -> Vec<String> {
        self.plays
            .lock()
            .unwrap()
            .iter()
            .map(|(stream, _)| stream.source.to_string())
            .collect()
    }
}

impl OutputSink for MockSink {
    fn play(&self, stream: StreamHandle, gain: f32) -> Result<(), SinkError> {
        if self.reject_plays.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("mock".to_string()));
        }
        self.plays.lock().unwrap().push((stream, gain));
        self.state.transition(SinkStatus::Buffering);
        if !self.hold_buffering.load(Ordering::SeqCst) {
            self.state.transition(SinkStatus::Playing);
        }
        Ok(())
    }

    fn pause(&self) -> bool {
        self.state
            .transition_if(SinkStatus::Playing, SinkStatus::Paused)
    }

    fn unpause(&self) -> bool {
        self.state
            .transition_if(SinkStatus::Paused, SinkStatus::Playing)
    }

    fn stop(&self, _force: bool) -> bool {
        !self.state.transition(SinkStatus::Idle).is_idle()
    }

    fn status(&self) -> SinkStatus {
        self.state.get()
    }

    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.state.subscribe()
    }
}

/// Resolver that succeeds for every source not listed in `failing`.
///
/// When gated, each resolution waits for one `gate.notify_one()`.
#[derive(Default)]
pub(crate) struct MockResolver {
    pub(crate) failing: Mutex<HashSet<String>>,
    pub(crate) gate: Option<Arc<Notify>>,
    pub(crate) calls: AtomicUsize,
}

impl MockResolver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub(crate) fn fail(&self, source: &str) {
        self.failing.lock().unwrap().insert(source.to_string());
    }
}

#[async_trait]
impl ResourceResolver for MockResolver {
    async fn resolve(&self, source: &SourceRef) -> Result<StreamHandle, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.as_ref() {
            gate.notified().await;
        }
        let key = source.to_string();
        if self.failing.lock().unwrap().contains(&key) {
            return Err(ResolveError::NotFound(key));
        }
        Ok(StreamHandle::new(source.clone()))
    }
}

pub(crate) struct MockConnection {
    pub(crate) channel: ChannelId,
    pub(crate) sink: Arc<MockSink>,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
    pub(crate) destroyed: AtomicUsize,
}

impl MockConnection {
    pub(crate) fn new(sink: Arc<MockSink>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            channel: ChannelId(7),
            sink,
            events,
            destroyed: AtomicUsize::new(0),
        })
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

impl VoiceConnection for MockConnection {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    fn sink(&self) -> Arc<dyn OutputSink> {
        self.sink.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GatewayBehavior {
    Ready,
    Hang,
    Refuse,
}

pub(crate) struct MockGateway {
    pub(crate) behavior: GatewayBehavior,
    pub(crate) joins: AtomicUsize,
    pub(crate) abandoned: Mutex<Vec<ServerId>>,
    pub(crate) connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockGateway {
    pub(crate) fn new(behavior: GatewayBehavior) -> Self {
        Self {
            behavior,
            joins: AtomicUsize::new(0),
            abandoned: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn last_connection(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection was made")
    }
}

#[async_trait]
impl VoiceGateway for MockGateway {
    async fn join(
        &self,
        _server: ServerId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            GatewayBehavior::Ready => {
                let connection = MockConnection::new(MockSink::new());
                self.connections.lock().unwrap().push(connection.clone());
                Ok(connection)
            }
            GatewayBehavior::Hang => std::future::pending().await,
            GatewayBehavior::Refuse => Err(VoiceError::Forbidden(channel)),
        }
    }

    async fn abandon(&self, server: ServerId) {
        self.abandoned.lock().unwrap().push(server);
    }
}

/// Build a track for `source` with a 10 second duration.
pub(crate) fn track(source: &str, hooks: TrackHooks) -> Arc<Track> {
    track_with_duration(source, 10, hooks)
}

pub(crate) fn track_with_duration(source: &str, secs: u64, hooks: TrackHooks) -> Arc<Track> {
    let info = MediaInfo {
        source: SourceRef::parse(source).expect("test source"),
        title: source.trim_start_matches('/').to_string(),
        duration_secs: secs,
        volume: 1.0,
    };
    Arc::new(Track::from_media(info, "tester", hooks))
}

/// Let spawned tasks on the current-thread runtime run to quiescence.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
