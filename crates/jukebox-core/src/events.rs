//! In-process event bus for session updates.
//!
//! Provides a lightweight broadcast channel for the command layer and tests.

use jukebox_types::{PlaybackFlags, ServerId};
use tokio::sync::broadcast;

/// Session event payloads published by the playback core.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QueueChanged { server: ServerId },
    FlagsChanged { server: ServerId, flags: PlaybackFlags },
    TrackStarted { server: ServerId, title: String },
    TrackFinished { server: ServerId, title: String },
    TrackFailed { server: ServerId, title: String, error: String },
    SessionClosed { server: ServerId },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Notify subscribers that a session's queue has changed.
    pub fn queue_changed(&self, server: ServerId) {
        let _ = self.sender.send(SessionEvent::QueueChanged { server });
    }

    pub fn flags_changed(&self, server: ServerId, flags: PlaybackFlags) {
        let _ = self.sender.send(SessionEvent::FlagsChanged { server, flags });
    }

    pub fn track_started(&self, server: ServerId, title: &str) {
        let _ = self.sender.send(SessionEvent::TrackStarted {
            server,
            title: title.to_string(),
        });
    }

    pub fn track_finished(&self, server: ServerId, title: &str) {
        let _ = self.sender.send(SessionEvent::TrackFinished {
            server,
            title: title.to_string(),
        });
    }

    /// Notify subscribers that a track was skipped because it could not play.
    pub fn track_failed(&self, server: ServerId, title: &str, error: String) {
        let _ = self.sender.send(SessionEvent::TrackFailed {
            server,
            title: title.to_string(),
            error,
        });
    }

    pub fn session_closed(&self, server: ServerId) {
        let _ = self.sender.send(SessionEvent::SessionClosed { server });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
