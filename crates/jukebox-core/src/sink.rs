//! Output sink abstraction for the audio player attached to a voice connection.
//!
//! The session only drives playback through this trait and reacts to the
//! status transitions it broadcasts.

use std::sync::Mutex;

use jukebox_types::SinkStatus;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::resolver::StreamHandle;

/// A status transition reported by a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkEvent {
    pub from: SinkStatus,
    pub to: SinkStatus,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output sink offline")]
    Offline,
    #[error("output sink rejected stream: {0}")]
    Rejected(String),
}

pub trait OutputSink: Send + Sync {
    /// Start streaming `stream` at the given gain.
    fn play(&self, stream: StreamHandle, gain: f32) -> Result<(), SinkError>;
    /// Returns `true` if the sink was playing and is now paused.
    fn pause(&self) -> bool;
    /// Returns `true` if the sink was paused and is now playing.
    fn unpause(&self) -> bool;
    /// Stop playback; the sink reports a transition to idle. Returns `true` if
    /// anything was stopped.
    fn stop(&self, force: bool) -> bool;
    fn status(&self) -> SinkStatus;
    fn subscribe(&self) -> broadcast::Receiver<SinkEvent>;
}

/// Status cell + transition broadcaster shared by sink implementations.
pub struct SinkState {
    status: Mutex<SinkStatus>,
    sender: broadcast::Sender<SinkEvent>,
}

impl SinkState {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            status: Mutex::new(SinkStatus::Idle),
            sender,
        }
    }

    pub fn get(&self) -> SinkStatus {
        *self.status.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Move to `to`, broadcasting the transition. Returns the previous status.
    ///
    /// Self-transitions are not broadcast.
    pub fn transition(&self, to: SinkStatus) -> SinkStatus {
        let from = {
            let mut status = self.status.lock().unwrap_or_else(|err| err.into_inner());
            std::mem::replace(&mut *status, to)
        };
        if from != to {
            let _ = self.sender.send(SinkEvent { from, to });
        }
        from
    }

    /// Transition only when the current status is `expected`.
    pub fn transition_if(&self, expected: SinkStatus, to: SinkStatus) -> bool {
        {
            let mut status = self.status.lock().unwrap_or_else(|err| err.into_inner());
            if *status != expected {
                return false;
            }
            *status = to;
        }
        if expected != to {
            let _ = self.sender.send(SinkEvent { from: expected, to });
        }
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sender.subscribe()
    }
}

impl Default for SinkState {
    fn default() -> Self {
        Self::new()
    }
}
