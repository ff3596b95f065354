//! Testing helpers and in-process fakes.
//!
//! Provides a transport that records what would have been sent to Telegram,
//! plus scripted stand-ins for yt-dlp and ffmpeg that touch only the
//! directories they are handed.

use crate::bot::transport::RelayTransport;
use crate::media::fetcher::{UNKNOWN_TRACK, UNKNOWN_UPLOADER};
use crate::media::{
    AudioTranscoder, FetchError, FetchResult, MediaFetcher, TranscodeFailure, TranscodeOutcome,
};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use teloxide::types::{ChatId, MessageId};
use tokio::sync::Mutex;

/// One outbound action captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// Plain text notice
    Notice {
        /// Target chat
        chat_id: ChatId,
        /// Assigned message id
        message_id: MessageId,
        /// Notice text
        text: String,
    },
    /// Video with caption and audio button
    Video {
        /// Target chat
        chat_id: ChatId,
        /// Assigned message id
        message_id: MessageId,
        /// File that was uploaded
        path: PathBuf,
        /// Caption text
        caption: String,
    },
    /// Audio reply
    Audio {
        /// Target chat
        chat_id: ChatId,
        /// Message replied to
        reply_to: MessageId,
        /// File that was uploaded
        path: PathBuf,
        /// Size of the file at send time
        size: u64,
    },
    /// Message deletion
    Deleted {
        /// Target chat
        chat_id: ChatId,
        /// Deleted message
        message_id: MessageId,
    },
    /// Interaction acknowledgment
    Acknowledged,
}

/// Transport that records every call instead of talking to Telegram
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI32,
    fail_video: bool,
}

impl RecordingTransport {
    /// Transport where every send succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose video uploads are rejected
    #[must_use]
    pub fn rejecting_video() -> Self {
        Self {
            fail_video: true,
            ..Self::default()
        }
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Everything recorded so far, in order
    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    /// Texts of all notices, in order
    pub async fn notices(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Notice { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Captions of all videos, in order
    pub async fn captions(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Video { caption, .. } => Some(caption.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RelayTransport for RecordingTransport {
    async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let message_id = self.allocate_id();
        self.sent.lock().await.push(Sent::Notice {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(message_id)
    }

    async fn send_video(&self, chat_id: ChatId, video: &Path, caption: &str) -> Result<MessageId> {
        if self.fail_video {
            anyhow::bail!("Bad Request: file is too big");
        }
        let message_id = self.allocate_id();
        self.sent.lock().await.push(Sent::Video {
            chat_id,
            message_id,
            path: video.to_path_buf(),
            caption: caption.to_string(),
        });
        Ok(message_id)
    }

    async fn send_audio(&self, chat_id: ChatId, reply_to: MessageId, audio: &Path) -> Result<()> {
        let size = tokio::fs::metadata(audio).await?.len();
        self.sent.lock().await.push(Sent::Audio {
            chat_id,
            reply_to,
            path: audio.to_path_buf(),
            size,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.sent.lock().await.push(Sent::Deleted {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn acknowledge_interaction(&self) -> Result<()> {
        self.sent.lock().await.push(Sent::Acknowledged);
        Ok(())
    }
}

/// Fetcher that writes a fake video or fails, as scripted
pub struct ScriptedFetcher {
    uploader: Option<String>,
    track: Option<String>,
    description: Option<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// Fetcher that stages `clip.mp4` and reports the given metadata
    #[must_use]
    pub fn succeeding(
        uploader: Option<&str>,
        track: Option<&str>,
        description: Option<&str>,
    ) -> Self {
        Self {
            uploader: uploader.map(str::to_string),
            track: track.map(str::to_string),
            description: description.map(str::to_string),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetcher that leaves a partial download behind and fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding(None, None, None)
        }
    }

    /// Number of fetches performed
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.fail {
            tokio::fs::write(dest_dir.join("clip.mp4.part"), b"partial").await?;
            return Err(FetchError::Unsupported(format!(
                "ERROR: Unsupported URL: {url}"
            )));
        }

        let video_path = dest_dir.join("clip.mp4");
        tokio::fs::write(&video_path, b"\x00\x00\x00\x18ftypmp42").await?;

        Ok(FetchResult {
            video_path,
            uploader: self
                .uploader
                .clone()
                .unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
            track: self
                .track
                .clone()
                .unwrap_or_else(|| UNKNOWN_TRACK.to_string()),
            description: self.description.clone(),
            source_url: url.to_string(),
        })
    }
}

/// How a [`StubTranscoder`] behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeScript {
    /// Exit 0 and write audio
    WritesAudio,
    /// Exit 0 without writing anything
    SilentlyProducesNothing,
    /// Exit 1 without writing anything
    Fails,
}

/// Transcoder that follows a [`TranscodeScript`]
pub struct StubTranscoder {
    script: TranscodeScript,
    calls: AtomicUsize,
}

impl StubTranscoder {
    /// Create a transcoder following `script`
    #[must_use]
    pub const fn new(script: TranscodeScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of transcodes performed
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AudioTranscoder for StubTranscoder {
    async fn transcode(
        &self,
        video: &Path,
        output: &Path,
    ) -> std::result::Result<TranscodeOutcome, TranscodeFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let exit_code = match self.script {
            TranscodeScript::WritesAudio => {
                let audio = tokio::fs::read(video).await.map_err(TranscodeFailure::Spawn)?;
                tokio::fs::write(output, [b"ID3".as_slice(), audio.as_slice()].concat())
                    .await
                    .map_err(TranscodeFailure::Spawn)?;
                0
            }
            TranscodeScript::SilentlyProducesNothing => 0,
            TranscodeScript::Fails => 1,
        };

        Ok(TranscodeOutcome {
            output: output.to_path_buf(),
            exit_code: Some(exit_code),
            stderr_tail: String::new(),
            output_valid: crate::media::transcoder::is_valid_output(output).await,
        })
    }
}
