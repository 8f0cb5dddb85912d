//! Voice transport seam: joining a channel and watching the connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jukebox_types::{ChannelId, ServerId};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::sink::OutputSink;

/// Connection health signals emitted by a voice connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transient disconnect; the gateway is rejoining.
    Reconnecting { attempt: u32 },
    Reconnected,
    /// The gateway gave up; the connection is unusable.
    Lost,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("missing permission to join channel {0}")]
    Forbidden(ChannelId),
    #[error("voice gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("voice connection was not ready within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

pub trait VoiceConnection: Send + Sync {
    fn channel(&self) -> ChannelId;
    /// The audio player subscribed to this connection.
    fn sink(&self) -> Arc<dyn OutputSink>;
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;
    fn destroy(&self);
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join `channel`, suspending until the connection is ready.
    async fn join(
        &self,
        server: ServerId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
    /// Tear down a partially established join.
    async fn abandon(&self, server: ServerId);
}

/// Join with a fixed deadline. On expiry the partial join is abandoned.
pub async fn join_with_timeout(
    gateway: &dyn VoiceGateway,
    server: ServerId,
    channel: ChannelId,
    timeout: Duration,
) -> Result<Arc<dyn VoiceConnection>, JoinError> {
    match tokio::time::timeout(timeout, gateway.join(server, channel)).await {
        Ok(Ok(connection)) => Ok(connection),
        Ok(Err(err)) => {
            tracing::warn!(server = %server, channel = %channel, error = %err, "voice join failed");
            Err(err.into())
        }
        Err(_) => {
            tracing::warn!(
                server = %server,
                channel = %channel,
                timeout_secs = timeout.as_secs(),
                "voice join timed out"
            );
            gateway.abandon(server).await;
            Err(JoinError::Timeout(timeout))
        }
    }
}
