//! Track descriptors and their one-shot lifecycle hooks.
//!
//! A [`Track`] is built once per request and shared (`Arc<Track>`) between the
//! queue and the session's current slot. Hooks fire at most once no matter how
//! many redundant transitions the sink reports.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use jukebox_types::TrackSummary;
use thiserror::Error;

use crate::resolver::ResolveError;
use crate::sink::SinkError;

/// Exponent used to map a linear volume onto a perceptual gain curve.
const LOG_GAIN_EXPONENT: f32 = 1.660964;

/// Where a track's audio comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceRef {
    /// Remote media page or stream URL.
    Url(String),
    /// Local audio file.
    File(PathBuf),
}

impl SourceRef {
    /// Parse user-supplied text; `http(s)://` becomes a URL, anything else a path.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(SourceRef::Url(trimmed.to_string()))
        } else {
            Some(SourceRef::File(PathBuf::from(trimmed)))
        }
    }

    /// Lowercase file extension, or an empty string when there is none.
    pub fn ext_hint(&self) -> String {
        let path = match self {
            SourceRef::Url(url) => {
                let without_query = url.split(['?', '#']).next().unwrap_or(url);
                PathBuf::from(without_query)
            }
            SourceRef::File(path) => path.clone(),
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url(url) => f.write_str(url),
            SourceRef::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Why a track could not be played.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A callback that runs at most once.
///
/// The closure is taken out of its slot before it runs, so re-entrant or
/// duplicate fires see an empty slot and do nothing.
pub struct OnceHook<A> {
    slot: Mutex<Option<Box<dyn FnOnce(A) + Send>>>,
}

impl<A> OnceHook<A> {
    pub fn new(hook: impl FnOnce(A) + Send + 'static) -> Self {
        Self {
            slot: Mutex::new(Some(Box::new(hook))),
        }
    }

    /// A hook that was never armed.
    pub fn noop() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Run the hook if it has not run yet. Returns `true` when it ran.
    pub fn fire(&self, arg: A) -> bool {
        let hook = self
            .slot
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        match hook {
            Some(hook) => {
                hook(arg);
                true
            }
            None => false,
        }
    }

    /// Drop the hook without running it. Returns `true` if it was armed.
    pub fn disarm(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
            .is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl<A> Default for OnceHook<A> {
    fn default() -> Self {
        Self::noop()
    }
}

/// Lifecycle callbacks supplied by whoever requested the track.
#[derive(Default)]
pub struct TrackHooks {
    start: OnceHook<()>,
    finish: OnceHook<()>,
    error: OnceHook<TrackError>,
}

impl TrackHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.start = OnceHook::new(move |()| hook());
        self
    }

    pub fn on_finish(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.finish = OnceHook::new(move |()| hook());
        self
    }

    pub fn on_error(mut self, hook: impl FnOnce(TrackError) + Send + 'static) -> Self {
        self.error = OnceHook::new(hook);
        self
    }
}

/// Metadata for a resolvable item, as returned by a media lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub source: SourceRef,
    pub title: String,
    pub duration_secs: u64,
    /// Linear volume in `[0, 1]`.
    pub volume: f32,
}

/// Immutable description of one playable item.
pub struct Track {
    source: SourceRef,
    title: String,
    duration_secs: u64,
    added_by: String,
    volume: f32,
    hooks: TrackHooks,
}

impl Track {
    /// Build a descriptor from a media record, the requester and its hooks.
    pub fn from_media(info: MediaInfo, added_by: impl Into<String>, hooks: TrackHooks) -> Self {
        let volume = if info.volume.is_finite() {
            info.volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            source: info.source,
            title: info.title,
            duration_secs: info.duration_secs,
            added_by: added_by.into(),
            volume,
            hooks,
        }
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn added_by(&self) -> &str {
        &self.added_by
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Output gain handed to the sink.
    pub fn gain(&self) -> f32 {
        logarithmic_gain(self.volume)
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            source: self.source.to_string(),
            title: self.title.clone(),
            duration_secs: self.duration_secs,
            added_by: self.added_by.clone(),
        }
    }

    pub fn notify_start(&self) -> bool {
        self.hooks.start.fire(())
    }

    pub fn notify_finish(&self) -> bool {
        self.hooks.finish.fire(())
    }

    pub fn notify_error(&self, err: TrackError) -> bool {
        self.hooks.error.fire(err)
    }

    /// Clear the start hook; used when a track is replayed by repeat.
    pub fn disarm_start(&self) {
        self.hooks.start.disarm();
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("source", &self.source)
            .field("title", &self.title)
            .field("duration_secs", &self.duration_secs)
            .field("added_by", &self.added_by)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

/// Map a linear `[0, 1]` volume onto the gain curve used by the sink.
pub fn logarithmic_gain(volume: f32) -> f32 {
    volume.clamp(0.0, 1.0).powf(LOG_GAIN_EXPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn info(title: &str) -> MediaInfo {
        MediaInfo {
            source: SourceRef::File(PathBuf::from(format!("/music/{title}.ogg"))),
            title: title.to_string(),
            duration_secs: 30,
            volume: 0.5,
        }
    }

    #[test]
    fn parse_source_distinguishes_urls_and_paths() {
        assert_eq!(
            SourceRef::parse(" https://example.com/watch?v=1 "),
            Some(SourceRef::Url("https://example.com/watch?v=1".to_string()))
        );
        assert_eq!(
            SourceRef::parse("ambient/rain.ogg"),
            Some(SourceRef::File(PathBuf::from("ambient/rain.ogg")))
        );
        assert_eq!(SourceRef::parse("   "), None);
    }

    #[test]
    fn ext_hint_ignores_query_string() {
        let url = SourceRef::Url("https://cdn.example.com/a/b.MP3?sig=abc".to_string());
        assert_eq!(url.ext_hint(), "mp3");
        let file = SourceRef::File(PathBuf::from("/music/a.flac"));
        assert_eq!(file.ext_hint(), "flac");
        let bare = SourceRef::Url("https://example.com/watch".to_string());
        assert_eq!(bare.ext_hint(), "");
    }

    #[test]
    fn hooks_fire_exactly_once() {
        let starts = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let hooks = {
            let starts = starts.clone();
            let finishes = finishes.clone();
            let errors = errors.clone();
            TrackHooks::new()
                .on_start(move || {
                    starts.fetch_add(1, Ordering::SeqCst);
                })
                .on_finish(move || {
                    finishes.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
        };
        let track = Track::from_media(info("a"), "alice", hooks);

        assert!(track.notify_start());
        assert!(!track.notify_start());
        assert!(track.notify_finish());
        assert!(!track.notify_finish());
        assert!(track.notify_error(ResolveError::NotFound("gone".to_string()).into()));
        assert!(!track.notify_error(ResolveError::NotFound("gone".to_string()).into()));

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_fire_is_absorbed() {
        let count = Arc::new(AtomicUsize::new(0));
        let hook: Arc<OnceHook<()>> = Arc::new(OnceHook::noop());
        let inner = hook.clone();
        let counter = count.clone();
        let outer = OnceHook::new(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.fire(());
        });
        assert!(outer.fire(()));
        assert!(!outer.fire(()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disarmed_start_does_not_run() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let track = Track::from_media(
            info("a"),
            "alice",
            TrackHooks::new().on_start(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        track.disarm_start();
        assert!(!track.notify_start());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn volume_is_clamped_and_gain_is_logarithmic() {
        let mut loud = info("a");
        loud.volume = 3.0;
        let track = Track::from_media(loud, "alice", TrackHooks::new());
        assert_eq!(track.volume(), 1.0);
        assert_eq!(track.gain(), 1.0);

        assert_eq!(logarithmic_gain(0.0), 0.0);
        let half = logarithmic_gain(0.5);
        assert!(half > 0.31 && half < 0.32, "gain was {half}");
    }

    #[test]
    fn summary_reflects_descriptor() {
        let track = Track::from_media(info("a"), "alice", TrackHooks::new());
        let summary = track.summary();
        assert_eq!(summary.title, "a");
        assert_eq!(summary.source, "/music/a.ogg");
        assert_eq!(summary.duration_secs, 30);
        assert_eq!(summary.added_by, "alice");
    }
}
