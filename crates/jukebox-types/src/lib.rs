use std::fmt;

use serde::{Deserialize, Serialize};

/// Chat-platform server (guild) identifier; one playback session exists per server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voice channel identifier within a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status reported by an output sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    /// Nothing loaded; the session may advance.
    #[default]
    Idle,
    /// A resource was handed over and is being buffered.
    Buffering,
    /// Audio is being sent to the channel.
    Playing,
    /// Playback is suspended by request.
    Paused,
}

impl SinkStatus {
    pub fn is_idle(self) -> bool {
        matches!(self, SinkStatus::Idle)
    }
}

/// Queue modifiers for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackFlags {
    /// Replay the current track indefinitely.
    pub repeat: bool,
    /// Re-queue finished tracks instead of discarding them.
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Randomize queue order and loop re-insertion position.
    pub shuffle: bool,
}

/// Display-level view of a queued or playing track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    /// Source reference as text (URL or file path).
    pub source: String,
    pub title: String,
    pub duration_secs: u64,
    /// Requester display name.
    pub added_by: String,
}

/// Point-in-time view of a session, used for status replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub server: ServerId,
    /// Track loaded into the sink, only while the sink is not idle.
    pub current: Option<TrackSummary>,
    /// Pending tracks in play order.
    pub queue: Vec<TrackSummary>,
    pub flags: PlaybackFlags,
    pub sink_status: SinkStatus,
    /// Sum of pending durations formatted as `H:MM:SS`.
    pub queued_duration: String,
}
