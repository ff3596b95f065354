//! Media Fetcher - resolves a post link into a local video file via yt-dlp
//!
//! The fetcher writes into a directory handed in by the caller. It never
//! cleans up after itself: on failure the caller removes the directory, on
//! success ownership of the files passes to the caller.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Extensions accepted as the fetched video
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

/// Uploader shown when the source does not report one
pub const UNKNOWN_UPLOADER: &str = "unknown";

/// Track label shown when the source does not report one
pub const UNKNOWN_TRACK: &str = "Unknown";

/// Patterns indicating the link itself cannot be extracted
const UNSUPPORTED_PATTERNS: &[&str] = &[
    "ERROR: Unsupported URL",
    "is not a valid URL",
    "Unable to extract",
    "Private video",
    "This video is private",
    "no longer available",
    "Sign in to view",
    "login required",
    "HTTP Error 404",
];

/// Errors that can occur while fetching media
#[derive(Debug, Error)]
pub enum FetchError {
    /// The extractor binary could not be started
    #[error("failed to spawn yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),
    /// The link is not something the extractor can resolve
    #[error("unsupported or unavailable link: {0}")]
    Unsupported(String),
    /// Network or remote service failure
    #[error("remote fetch failed: {0}")]
    Remote(String),
    /// The extractor ran longer than allowed and was killed
    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),
    /// The extractor finished but left no video file behind
    #[error("no media file produced in {0}")]
    NoMediaFile(PathBuf),
    /// Reading the staging directory failed
    #[error("staging directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// A successfully fetched post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// The staged video file
    pub video_path: PathBuf,
    /// Uploader handle, `unknown` when absent
    pub uploader: String,
    /// Track name, `Unknown` when absent
    pub track: String,
    /// Raw description as provided by the source
    pub description: Option<String>,
    /// Link the media was fetched from
    pub source_url: String,
}

/// Interface for anything that can resolve a link into a staged video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the media behind `url` into `dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` if the link cannot be resolved or no video file is produced.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchResult, FetchError>;
}

/// Subset of the yt-dlp info JSON the relay cares about
#[derive(Debug, Default, Deserialize)]
struct YtdlpInfo {
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
}

/// Fetcher that shells out to yt-dlp
#[derive(Debug, Clone)]
pub struct YtdlpFetcher {
    binary: PathBuf,
    max_height: u32,
    timeout: Duration,
}

impl YtdlpFetcher {
    /// Create a fetcher for the given binary, resolution ceiling and timeout
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, max_height: u32, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            max_height,
            timeout,
        }
    }

    /// Format selector: capped stream first, best composite as fallback
    #[must_use]
    pub fn format_selector(&self) -> String {
        format!("best[height<={}]/best", self.max_height)
    }

    fn build_args(&self, url: &str, dest_dir: &Path) -> Vec<String> {
        let template = dest_dir.join("%(title).50s.%(ext)s");
        vec![
            "-f".to_string(),
            self.format_selector(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl MediaFetcher for YtdlpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchResult, FetchError> {
        let args = self.build_args(url, dest_dir);
        debug!(url = %url, dir = %dest_dir.display(), "Executing yt-dlp");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FetchError::Spawn)?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| FetchError::TimedOut(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(url = %url, status = %output.status, error = %stderr, "yt-dlp failed");
            return Err(classify_failure(stderr));
        }

        let info = parse_info(&String::from_utf8_lossy(&output.stdout));
        let video_path = find_media_file(dest_dir).await?;

        info!(url = %url, path = %video_path.display(), "Media fetched");

        Ok(FetchResult {
            video_path,
            uploader: info
                .uploader
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
            track: info
                .track
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_TRACK.to_string()),
            description: info.description,
            source_url: info.webpage_url.unwrap_or_else(|| url.to_string()),
        })
    }
}

/// Map yt-dlp stderr onto a fetch error kind
fn classify_failure(stderr: String) -> FetchError {
    if UNSUPPORTED_PATTERNS
        .iter()
        .any(|pattern| stderr.contains(pattern))
    {
        FetchError::Unsupported(stderr)
    } else {
        FetchError::Remote(stderr)
    }
}

/// Parse the first info JSON line; metadata is optional, so garbage yields defaults
fn parse_info(stdout: &str) -> YtdlpInfo {
    let Some(line) = stdout.lines().find(|l| l.trim_start().starts_with('{')) else {
        warn!("yt-dlp printed no metadata");
        return YtdlpInfo::default();
    };

    serde_json::from_str(line).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to parse yt-dlp metadata");
        YtdlpInfo::default()
    })
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Pick the staged video: first matching file by name
///
/// # Errors
///
/// Returns `FetchError::NoMediaFile` if nothing matches, `FetchError::Io` if the directory cannot be read.
pub async fn find_media_file(dir: &Path) -> Result<PathBuf, FetchError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_video_file(&path) {
            candidates.push(path);
        }
    }

    candidates.sort();
    if candidates.len() > 1 {
        debug!(count = candidates.len(), "Several media files staged, taking the first");
    }

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::NoMediaFile(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_selector_uses_ceiling() {
        let fetcher = YtdlpFetcher::new("yt-dlp", 720, Duration::from_secs(5));
        assert_eq!(fetcher.format_selector(), "best[height<=720]/best");
    }

    #[test]
    fn test_args_end_with_url() {
        let fetcher = YtdlpFetcher::new("yt-dlp", 480, Duration::from_secs(5));
        let args = fetcher.build_args("https://instagram.com/p/x", Path::new("/tmp/stage"));
        assert_eq!(args.last().map(String::as_str), Some("https://instagram.com/p/x"));
        assert!(args.contains(&"best[height<=480]/best".to_string()));
        assert!(args.contains(&"/tmp/stage/%(title).50s.%(ext)s".to_string()));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: Unsupported URL: https://x".to_string()),
            FetchError::Unsupported(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: Connection reset by peer".to_string()),
            FetchError::Remote(_)
        ));
    }

    #[test]
    fn test_parse_info_defaults_on_garbage() {
        let info = parse_info("[download] 100%\nnot json");
        assert!(info.uploader.is_none());
        assert!(info.description.is_none());
    }

    #[test]
    fn test_parse_info_reads_fields() {
        let info = parse_info(
            r##"{"uploader":"alice","track":null,"description":"#fun day","webpage_url":"https://instagram.com/p/abc"}"##,
        );
        assert_eq!(info.uploader.as_deref(), Some("alice"));
        assert!(info.track.is_none());
        assert_eq!(info.description.as_deref(), Some("#fun day"));
    }

    #[tokio::test]
    async fn test_find_media_file_picks_first_video() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("b.webm"), b"x").await?;
        tokio::fs::write(dir.path().join("a.mp4"), b"x").await?;
        tokio::fs::write(dir.path().join("a.jpg"), b"x").await?;

        let found = find_media_file(dir.path()).await?;
        assert_eq!(found, dir.path().join("a.mp4"));
        Ok(())
    }

    #[tokio::test]
    async fn test_find_media_file_empty_dir() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("cover.jpg"), b"x").await?;

        let result = find_media_file(dir.path()).await;
        assert!(matches!(result, Err(FetchError::NoMediaFile(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let fetcher = YtdlpFetcher::new(
            "/nonexistent/yt-dlp-binary",
            720,
            Duration::from_secs(5),
        );

        let result = fetcher.fetch("https://instagram.com/p/x", dir.path()).await;
        assert!(matches!(result, Err(FetchError::Spawn(_))));
        Ok(())
    }
}
