//! In-process voice gateway: every join succeeds immediately with a clock sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jukebox_core::{ConnectionEvent, OutputSink, VoiceConnection, VoiceError, VoiceGateway};
use jukebox_types::{ChannelId, ServerId};
use tokio::sync::broadcast;

use crate::clock_sink::ClockSink;

pub(crate) struct LocalConnection {
    server: ServerId,
    channel: ChannelId,
    sink: Arc<ClockSink>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl LocalConnection {
    fn new(server: ServerId, channel: ChannelId) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            server,
            channel,
            sink: Arc::new(ClockSink::new()),
            events,
        }
    }

    /// Report a permanent loss, as a real gateway does after its rejoin attempts.
    pub(crate) fn drop_link(&self) {
        let _ = self.events.send(ConnectionEvent::Lost);
    }
}

impl VoiceConnection for LocalConnection {
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
        self.sink.stop(true);
        tracing::info!(server = %self.server, channel = %self.channel, "left voice channel");
    }
}

#[derive(Default)]
pub(crate) struct LocalVoiceGateway {
    connections: Mutex<HashMap<ServerId, Arc<LocalConnection>>>,
}

impl LocalVoiceGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection(&self, server: ServerId) -> Option<Arc<LocalConnection>> {
        self.connections
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(&server)
            .cloned()
    }
}

#[async_trait]
impl VoiceGateway for LocalVoiceGateway {
    async fn join(
        &self,
        server: ServerId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        if channel.0 == 0 {
            return Err(VoiceError::Forbidden(channel));
        }
        let connection = Arc::new(LocalConnection::new(server, channel));
        self.connections
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(server, connection.clone());
        Ok(connection)
    }

    async fn abandon(&self, server: ServerId) {
        self.connections
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&server);
    }
}
