//! Playback core for a voice-channel music bot.
//!
//! One [`Session`] per server owns a queue of [`Track`]s and advances through
//! it as the output sink goes idle. Voice transport, resource resolution and
//! audio output are reached only through the traits in [`voice`], [`resolver`]
//! and [`sink`].

pub mod config;
pub mod display;
pub mod events;
pub mod presets;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod shuffle;
pub mod sink;
pub mod track;
pub mod voice;

#[cfg(test)]
mod test_support;

pub use events::{EventBus, SessionEvent};
pub use registry::SessionRegistry;
pub use resolver::{ResolveError, ResourceResolver, StreamHandle};
pub use session::Session;
pub use sink::{OutputSink, SinkError, SinkEvent, SinkState};
pub use track::{MediaInfo, SourceRef, Track, TrackError, TrackHooks};
pub use voice::{ConnectionEvent, JoinError, VoiceConnection, VoiceError, VoiceGateway};
