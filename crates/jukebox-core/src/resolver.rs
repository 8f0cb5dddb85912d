//! Resource resolution seam.
//!
//! A resolver turns a track's [`SourceRef`] into something the sink can stream,
//! right before playback.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::SourceRef;

/// A streamable resource ready to hand to an output sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHandle {
    pub source: SourceRef,
    /// Container/extension hint for the decoder (may be empty).
    pub ext_hint: String,
    /// Duration, when the resolver could determine it.
    pub duration: Option<Duration>,
}

impl StreamHandle {
    pub fn new(source: SourceRef) -> Self {
        let ext_hint = source.ext_hint();
        Self {
            source,
            ext_hint,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("source not found or deleted: {0}")]
    NotFound(String),
    #[error("source blocked: {0}")]
    Blocked(String),
    #[error("malformed source reference: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Resolve a source into a stream. May suspend on I/O and has no deadline.
    async fn resolve(&self, source: &SourceRef) -> Result<StreamHandle, ResolveError>;
}
