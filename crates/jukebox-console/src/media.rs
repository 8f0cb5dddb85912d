//! Media lookup for local files and HTTP sources.
//!
//! `probe` builds the queue entry when a track is requested; `resolve` checks
//! the source again right before playback.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use jukebox_core::{MediaInfo, ResolveError, ResourceResolver, SourceRef, StreamHandle};
use lofty::{Accessor, AudioFile, TaggedFileExt};
use reqwest::{Client, StatusCode, Url};

/// Builds the media record for a play request.
#[async_trait]
pub(crate) trait MediaProbe: Send + Sync {
    async fn probe(&self, source: &SourceRef, volume: f32) -> Result<MediaInfo, ResolveError>;
}

#[derive(Debug, Default, PartialEq)]
struct FileTags {
    title: Option<String>,
    duration: Option<Duration>,
}

/// Read the title tag and duration. Unreadable or untagged files yield nothing.
fn read_file_tags(path: &Path) -> FileTags {
    let tagged = match lofty::read_from_path(path) {
        Ok(tagged) => tagged,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "no readable tags");
            return FileTags::default();
        }
    };
    let duration = tagged.properties().duration();
    let title = tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .and_then(|tag| tag.title().map(|title| title.trim().to_string()))
        .filter(|title| !title.is_empty());
    FileTags {
        title,
        duration: (!duration.is_zero()).then_some(duration),
    }
}

fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Map a non-success HTTP status onto a resolution error.
fn status_error(url: &str, status: StatusCode) -> Option<ResolveError> {
    if status.is_success() {
        return None;
    }
    let err = match status.as_u16() {
        404 | 410 => ResolveError::NotFound(url.to_string()),
        403 | 451 => ResolveError::Blocked(url.to_string()),
        code => ResolveError::Unreachable(format!("{url}: HTTP {code}")),
    };
    Some(err)
}

async fn check_file(path: &Path) -> Result<(), ResolveError> {
    let meta = tokio::fs::metadata(path).await.map_err(|err| match err.kind() {
        ErrorKind::NotFound => ResolveError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => ResolveError::Blocked(path.display().to_string()),
        _ => ResolveError::Unreachable(format!("{}: {err}", path.display())),
    })?;
    if !meta.is_file() {
        return Err(ResolveError::Malformed(format!(
            "{} is not a file",
            path.display()
        )));
    }
    Ok(())
}

async fn file_tags(path: PathBuf) -> Result<FileTags, ResolveError> {
    tokio::task::spawn_blocking(move || read_file_tags(&path))
        .await
        .map_err(|err| ResolveError::Unreachable(format!("tag reader failed: {err}")))
}

pub(crate) struct MediaResolver {
    client: Client,
}

impl MediaResolver {
    pub(crate) fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn parse_url(raw: &str) -> Result<Url, ResolveError> {
        Url::parse(raw).map_err(|err| ResolveError::Malformed(format!("{raw}: {err}")))
    }
}

#[async_trait]
impl ResourceResolver for MediaResolver {
    async fn resolve(&self, source: &SourceRef) -> Result<StreamHandle, ResolveError> {
        match source {
            SourceRef::File(path) => {
                check_file(path).await?;
                let tags = file_tags(path.clone()).await?;
                Ok(StreamHandle::new(source.clone()).with_duration(tags.duration))
            }
            SourceRef::Url(raw) => {
                let url = Self::parse_url(raw)?;
                let resp = self
                    .client
                    .head(url)
                    .send()
                    .await
                    .map_err(|err| ResolveError::Unreachable(format!("{raw}: {err}")))?;
                if let Some(err) = status_error(raw, resp.status()) {
                    return Err(err);
                }
                Ok(StreamHandle::new(source.clone()))
            }
        }
    }
}

#[async_trait]
impl MediaProbe for MediaResolver {
    async fn probe(&self, source: &SourceRef, volume: f32) -> Result<MediaInfo, ResolveError> {
        match source {
            SourceRef::File(path) => {
                check_file(path).await?;
                let tags = file_tags(path.clone()).await?;
                Ok(MediaInfo {
                    source: source.clone(),
                    title: tags.title.unwrap_or_else(|| file_stem_title(path)),
                    duration_secs: tags.duration.map(|d| d.as_secs()).unwrap_or(0),
                    volume,
                })
            }
            SourceRef::Url(raw) => {
                Self::parse_url(raw)?;
                Ok(MediaInfo {
                    source: source.clone(),
                    title: raw.clone(),
                    duration_secs: 0,
                    volume,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jukebox-media-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    #[test]
    fn status_codes_map_to_resolve_errors() {
        let url = "https://example.com/a.mp3";
        assert!(status_error(url, StatusCode::OK).is_none());
        assert!(matches!(
            status_error(url, StatusCode::NOT_FOUND),
            Some(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            status_error(url, StatusCode::GONE),
            Some(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            status_error(url, StatusCode::FORBIDDEN),
            Some(ResolveError::Blocked(_))
        ));
        assert!(matches!(
            status_error(url, StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS),
            Some(ResolveError::Blocked(_))
        ));
        assert!(matches!(
            status_error(url, StatusCode::BAD_GATEWAY),
            Some(ResolveError::Unreachable(msg)) if msg.contains("502")
        ));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let resolver = MediaResolver::new();
        let source = SourceRef::parse("/definitely/not/here.ogg").expect("source");
        assert!(matches!(
            resolver.resolve(&source).await,
            Err(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            resolver.probe(&source, 1.0).await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn directory_is_malformed() {
        let dir = temp_dir("dir");
        let source = SourceRef::File(dir.clone());
        assert!(matches!(
            MediaResolver::new().resolve(&source).await,
            Err(ResolveError::Malformed(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn untagged_file_falls_back_to_stem() {
        let dir = temp_dir("stem");
        let path = dir.join("Morning Rain.ogg");
        std::fs::write(&path, b"not really audio").expect("write");
        let source = SourceRef::File(path.clone());
        let resolver = MediaResolver::new();

        let info = resolver.probe(&source, 0.5).await.expect("probe");
        assert_eq!(info.title, "Morning Rain");
        assert_eq!(info.duration_secs, 0);
        assert_eq!(info.volume, 0.5);

        let stream = resolver.resolve(&source).await.expect("resolve");
        assert_eq!(stream.ext_hint, "ogg");
        assert_eq!(stream.duration, None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn url_probe_uses_url_as_title() {
        let resolver = MediaResolver::new();
        let source = SourceRef::parse("https://radio.example.com/live.mp3").expect("source");
        let info = resolver.probe(&source, 1.0).await.expect("probe");
        assert_eq!(info.title, "https://radio.example.com/live.mp3");

        let bad = SourceRef::Url("https://exa mple.com".to_string());
        assert!(matches!(
            resolver.probe(&bad, 1.0).await,
            Err(ResolveError::Malformed(_))
        ));
    }
}
