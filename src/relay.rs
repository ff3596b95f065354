//! Conversation Controller
//!
//! Orchestrates the media pipeline for the two events the bot reacts to:
//! an incoming text message and a press on the audio button of a relayed
//! video. Both paths end in exactly one terminal outcome and never
//! propagate failures to the dispatcher.

use crate::bot::transport::RelayTransport;
use crate::bot::views::{DefaultRelayView, RelayView};
use crate::config::Settings;
use crate::media::{
    audio_path_for, compose_caption, AudioTranscoder, FetchError, FfmpegTranscoder, MediaFetcher,
    TranscodeFailure, YtdlpFetcher,
};
use crate::store::{ArtifactEntry, ArtifactError, ArtifactStore, PresentationHandle, StagedDir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Characters trimmed from the end of a link pasted into prose
const LINK_TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ')', ']', '>', '"', '\''];

/// Failures of a handling path
#[derive(Debug, Error)]
pub enum RelayError {
    /// The media could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The audio could not be derived
    #[error(transparent)]
    Transcode(#[from] TranscodeFailure),
    /// The store rejected or lacked an entry
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// The staging directory could not be created
    #[error("failed to create staging directory: {0}")]
    Staging(#[source] std::io::Error),
    /// Telegram refused a send
    #[error("delivery failed: {0:#}")]
    Delivery(anyhow::Error),
}

/// Terminal state of the message path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// No link in the message; nothing was sent
    Ignored,
    /// Video sent and staged under the handle
    Delivered(PresentationHandle),
    /// The chat was told the fetch failed
    FailureNotified,
}

/// Terminal state of the interaction path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Audio sent as a reply
    Delivered,
    /// The chat was told the video is gone
    ExpiredNotified,
    /// The chat was told the audio failed
    FailureNotified,
}

/// Finds the link to fetch in a message.
///
/// Returns `None` when the message does not mention `marker`. Otherwise
/// returns the first whitespace-separated token containing the marker,
/// without trailing punctuation.
///
/// # Examples
///
/// ```
/// use reel_relay::relay::extract_link;
/// assert_eq!(
///     extract_link("look at https://instagram.com/p/abc123!", "instagram.com"),
///     Some("https://instagram.com/p/abc123")
/// );
/// assert_eq!(extract_link("hello there", "instagram.com"), None);
/// ```
#[must_use]
pub fn extract_link<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() || !text.contains(marker) {
        return None;
    }

    let link = text
        .split_whitespace()
        .find(|token| token.contains(marker))
        .map_or(text.trim(), |token| {
            token.trim_end_matches(LINK_TRAILING_PUNCTUATION)
        });
    Some(link)
}

/// Drives fetch, presentation, transcoding and cleanup.
pub struct RelayController {
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn AudioTranscoder>,
    store: Arc<ArtifactStore>,
    link_marker: String,
    staging_root: PathBuf,
}

impl RelayController {
    /// Create a controller from its collaborators
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn AudioTranscoder>,
        store: Arc<ArtifactStore>,
        link_marker: impl Into<String>,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            store,
            link_marker: link_marker.into(),
            staging_root: staging_root.into(),
        }
    }

    /// Create a controller backed by yt-dlp and ffmpeg as configured
    #[must_use]
    pub fn from_settings(settings: &Settings, store: Arc<ArtifactStore>) -> Self {
        let fetcher = YtdlpFetcher::new(
            &settings.ytdlp_path,
            settings.max_video_height,
            settings.fetch_timeout(),
        );
        let transcoder = FfmpegTranscoder::new(
            &settings.ffmpeg_path,
            settings.audio_bitrate_kbps,
            settings.transcode_timeout(),
        );
        Self::new(
            Arc::new(fetcher),
            Arc::new(transcoder),
            store,
            settings.link_marker.clone(),
            settings.staging_root(),
        )
    }

    /// The store shared by both handling paths
    #[must_use]
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// The substring that marks a message as a link
    #[must_use]
    pub fn link_marker(&self) -> &str {
        &self.link_marker
    }

    /// Handle an incoming text message.
    pub async fn handle_text(
        &self,
        transport: &dyn RelayTransport,
        chat_id: ChatId,
        text: &str,
    ) -> MessageOutcome {
        let Some(link) = extract_link(text, &self.link_marker) else {
            return MessageOutcome::Ignored;
        };

        let notice = match transport
            .send_notice(chat_id, DefaultRelayView::fetching())
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(chat_id = chat_id.0, error = %e, "Failed to send fetching notice");
                None
            }
        };

        let result = self.relay_media(transport, chat_id, text, link).await;

        if let Some(notice_id) = notice {
            if let Err(e) = transport.delete_message(chat_id, notice_id).await {
                debug!(chat_id = chat_id.0, error = %e, "Fetching notice not removed");
            }
        }

        match result {
            Ok(handle) => {
                info!(handle = %handle, link = %link, "Video relayed");
                MessageOutcome::Delivered(handle)
            }
            Err(e) => {
                error!(chat_id = chat_id.0, link = %link, error = %e, "Failed to relay media");
                notify(transport, chat_id, DefaultRelayView::fetch_failed()).await;
                MessageOutcome::FailureNotified
            }
        }
    }

    /// Handle a press on the audio button of the video identified by `handle`.
    pub async fn handle_interaction(
        &self,
        transport: &dyn RelayTransport,
        handle: PresentationHandle,
    ) -> InteractionOutcome {
        if let Err(e) = transport.acknowledge_interaction().await {
            warn!(handle = %handle, error = %e, "Failed to acknowledge interaction");
        }

        let entry = match self.store.take(handle).await {
            Ok(entry) => entry,
            Err(e) => {
                info!(handle = %handle, reason = %e, "Audio requested for expired video");
                notify(transport, handle.chat_id, DefaultRelayView::expired()).await;
                return InteractionOutcome::ExpiredNotified;
            }
        };

        let result = self
            .deliver_audio(transport, handle, entry.video_path())
            .await;
        // The entry is consumed whatever the transcode did
        entry.release().await;

        match result {
            Ok(()) => {
                info!(handle = %handle, "Audio delivered");
                InteractionOutcome::Delivered
            }
            Err(e) => {
                error!(handle = %handle, error = %e, "Failed to deliver audio");
                notify(transport, handle.chat_id, DefaultRelayView::audio_failed()).await;
                InteractionOutcome::FailureNotified
            }
        }
    }

    /// Stage, fetch, present and record; the directory is released on any failure
    async fn relay_media(
        &self,
        transport: &dyn RelayTransport,
        chat_id: ChatId,
        text: &str,
        link: &str,
    ) -> Result<PresentationHandle, RelayError> {
        let staged = StagedDir::create_in(&self.staging_root).map_err(RelayError::Staging)?;

        match self
            .present(transport, chat_id, text, link, staged.path())
            .await
        {
            Ok((message_id, video_path)) => {
                let handle = PresentationHandle::new(chat_id, message_id);
                self.store
                    .insert(handle, ArtifactEntry::new(staged, video_path))
                    .await?;
                Ok(handle)
            }
            Err(e) => {
                staged.release().await;
                Err(e)
            }
        }
    }

    async fn present(
        &self,
        transport: &dyn RelayTransport,
        chat_id: ChatId,
        text: &str,
        link: &str,
        dir: &Path,
    ) -> Result<(MessageId, PathBuf), RelayError> {
        let fetched = self.fetcher.fetch(link, dir).await?;
        let caption = compose_caption(&fetched, text);

        let message_id = transport
            .send_video(chat_id, &fetched.video_path, &caption)
            .await
            .map_err(RelayError::Delivery)?;

        Ok((message_id, fetched.video_path))
    }

    async fn deliver_audio(
        &self,
        transport: &dyn RelayTransport,
        handle: PresentationHandle,
        video: &Path,
    ) -> Result<(), RelayError> {
        let audio_path = audio_path_for(video);
        let audio = self
            .transcoder
            .transcode(video, &audio_path)
            .await?
            .into_result()?;

        transport
            .send_audio(handle.chat_id, handle.message_id, &audio)
            .await
            .map_err(RelayError::Delivery)
    }
}

async fn notify(transport: &dyn RelayTransport, chat_id: ChatId, text: &str) {
    if let Err(e) = transport.send_notice(chat_id, text).await {
        error!(chat_id = chat_id.0, error = %e, "Failed to send notice");
    }
}
