//! Audio Transcoder - derives an MP3 from a staged video via ffmpeg
//!
//! The outcome of every run is reported in full (exit code, stderr tail,
//! whether the output file is usable) so the caller can branch on it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Suffix appended to the video path to name the derived audio file
pub const AUDIO_SUFFIX: &str = ".mp3";

/// Ways a transcode can fail
#[derive(Debug, Error)]
pub enum TranscodeFailure {
    /// The encoder binary could not be started
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),
    /// The encoder ran longer than allowed and was killed
    #[error("transcode timed out after {0:?}")]
    TimedOut(Duration),
    /// The encoder exited unsuccessfully
    #[error("ffmpeg exited with code {code:?}: {stderr}")]
    Exit {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Last line of the diagnostic stream
        stderr: String,
    },
    /// The encoder reported success but the output is missing or empty
    #[error("transcode produced no audio at {0}")]
    MissingOutput(PathBuf),
}

/// Structured result of one encoder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    /// Where the audio was supposed to be written
    pub output: PathBuf,
    /// Process exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Last line of the diagnostic stream
    pub stderr_tail: String,
    /// Output exists and is non-empty
    pub output_valid: bool,
}

impl TranscodeOutcome {
    /// Whether the audio file can be delivered
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && self.output_valid
    }

    /// Turn the outcome into the audio path or the failure that prevents delivery.
    ///
    /// # Errors
    ///
    /// Returns `TranscodeFailure::Exit` for a non-zero exit and
    /// `TranscodeFailure::MissingOutput` when the file is absent or empty.
    pub fn into_result(self) -> Result<PathBuf, TranscodeFailure> {
        if self.exit_code != Some(0) {
            return Err(TranscodeFailure::Exit {
                code: self.exit_code,
                stderr: self.stderr_tail,
            });
        }
        if !self.output_valid {
            return Err(TranscodeFailure::MissingOutput(self.output));
        }
        Ok(self.output)
    }
}

/// Interface for anything that can strip a video down to audio
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Encode the audio stream of `video` into `output`.
    ///
    /// # Errors
    ///
    /// Returns a `TranscodeFailure` only when the encoder cannot run at all;
    /// an unsuccessful run is reported through the outcome.
    async fn transcode(
        &self,
        video: &Path,
        output: &Path,
    ) -> Result<TranscodeOutcome, TranscodeFailure>;
}

/// Audio destination for a staged video: the video path plus `.mp3`
#[must_use]
pub fn audio_path_for(video: &Path) -> PathBuf {
    let mut raw = video.as_os_str().to_os_string();
    raw.push(AUDIO_SUFFIX);
    PathBuf::from(raw)
}

/// Check that a file exists and has content
pub async fn is_valid_output(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// Transcoder that shells out to ffmpeg with libmp3lame
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    bitrate_kbps: u32,
    timeout: Duration,
}

impl FfmpegTranscoder {
    /// Create a transcoder for the given binary, bitrate and timeout
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, bitrate_kbps: u32, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            bitrate_kbps,
            timeout,
        }
    }

    // -y               : overwrite output without asking
    // -vn              : drop the video stream
    // -acodec libmp3lame, -ab <n>k : MP3 at a fixed bitrate
    fn build_args(&self, video: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-ab".to_string(),
            format!("{}k", self.bitrate_kbps),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        video: &Path,
        output: &Path,
    ) -> Result<TranscodeOutcome, TranscodeFailure> {
        debug!(input = %video.display(), output = %output.display(), "Executing ffmpeg");

        let child = Command::new(&self.binary)
            .args(self.build_args(video, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeFailure::Spawn)?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeFailure::TimedOut(self.timeout))?
            .map_err(TranscodeFailure::Spawn)?;

        let stderr = String::from_utf8_lossy(&result.stderr);
        let outcome = TranscodeOutcome {
            output: output.to_path_buf(),
            exit_code: result.status.code(),
            stderr_tail: stderr.lines().last().unwrap_or_default().to_string(),
            output_valid: is_valid_output(output).await,
        };

        if outcome.is_success() {
            info!(output = %output.display(), "Audio extracted");
        } else {
            warn!(
                exit_code = ?outcome.exit_code,
                output_valid = outcome.output_valid,
                error = %outcome.stderr_tail,
                "ffmpeg did not produce usable audio"
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_path_appends_suffix() {
        assert_eq!(
            audio_path_for(Path::new("/tmp/stage/clip.mp4")),
            PathBuf::from("/tmp/stage/clip.mp4.mp3")
        );
    }

    #[test]
    fn test_args_carry_bitrate_and_strip_video() {
        let transcoder = FfmpegTranscoder::new("ffmpeg", 192, Duration::from_secs(5));
        let args = transcoder.build_args(Path::new("in.mp4"), Path::new("in.mp4.mp3"));
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("in.mp4.mp3"));
    }

    #[test]
    fn test_outcome_nonzero_exit_is_failure() {
        let outcome = TranscodeOutcome {
            output: PathBuf::from("a.mp3"),
            exit_code: Some(1),
            stderr_tail: "Invalid data found when processing input".to_string(),
            output_valid: false,
        };
        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.into_result(),
            Err(TranscodeFailure::Exit { code: Some(1), .. })
        ));
    }

    #[test]
    fn test_outcome_missing_output_is_failure() {
        let outcome = TranscodeOutcome {
            output: PathBuf::from("a.mp3"),
            exit_code: Some(0),
            stderr_tail: String::new(),
            output_valid: false,
        };
        assert!(matches!(
            outcome.into_result(),
            Err(TranscodeFailure::MissingOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_file_is_not_valid_output() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let empty = dir.path().join("empty.mp3");
        let full = dir.path().join("full.mp3");
        tokio::fs::write(&empty, b"").await?;
        tokio::fs::write(&full, b"ID3").await?;

        assert!(!is_valid_output(&empty).await);
        assert!(is_valid_output(&full).await);
        assert!(!is_valid_output(&dir.path().join("absent.mp3")).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let transcoder =
            FfmpegTranscoder::new("/nonexistent/ffmpeg-binary", 192, Duration::from_secs(5));
        let video = dir.path().join("clip.mp4");

        let result = transcoder.transcode(&video, &audio_path_for(&video)).await;
        assert!(matches!(result, Err(TranscodeFailure::Spawn(_))));
        Ok(())
    }
}
