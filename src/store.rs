//! Artifact Store
//!
//! Maps the message that displays a relayed video to the staging directory
//! holding that video. An entry owns its directory: removing the entry is
//! the only way the directory gets deleted. Entries are leased; a background
//! reaper releases the ones nobody asked audio for.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::types::{ChatId, MessageId};
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of every staging directory name
const STAGING_PREFIX: &str = "reel-relay-";

/// Identifies the message that carries a relayed video.
///
/// Telegram message ids are only unique within a chat, so the chat is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresentationHandle {
    /// Chat the video was sent to
    pub chat_id: ChatId,
    /// Id of the video message
    pub message_id: MessageId,
}

impl PresentationHandle {
    /// Create a handle for a message in a chat
    #[must_use]
    pub const fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

impl fmt::Display for PresentationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id.0, self.message_id.0)
    }
}

/// Errors that can occur while using the store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    /// No live entry for the handle (consumed, reaped, or never created)
    #[error("no staged video for message {0}")]
    Expired(PresentationHandle),
    /// An entry already exists for the handle
    #[error("message {0} already has a staged video")]
    Occupied(PresentationHandle),
}

/// A freshly created, uniquely named directory for one request
#[derive(Debug)]
pub struct StagedDir {
    dir: TempDir,
}

impl StagedDir {
    /// Create a new staging directory under `root`, creating `root` if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn create_in(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)?;
        debug!(path = %dir.path().display(), "Staging directory created");
        Ok(Self { dir })
    }

    /// Path of the directory
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything in it without blocking the runtime
    pub async fn release(self) {
        let path = self.dir.keep();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!(path = %path.display(), "Staging directory removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging directory"),
        }
    }
}

/// A staged video waiting for an audio request
#[derive(Debug)]
pub struct ArtifactEntry {
    staged: StagedDir,
    video_path: PathBuf,
    leased_at: Instant,
}

impl ArtifactEntry {
    /// Bind a staged video to its directory, starting the lease now
    #[must_use]
    pub fn new(staged: StagedDir, video_path: PathBuf) -> Self {
        Self {
            staged,
            video_path,
            leased_at: Instant::now(),
        }
    }

    /// The staged video file
    #[must_use]
    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    /// The directory owned by this entry
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.staged.path()
    }

    /// Whether the lease has run out
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.leased_at.elapsed() >= ttl
    }

    /// Consume the entry and delete its directory
    pub async fn release(self) {
        self.staged.release().await;
    }
}

/// Ephemeral mapping from presentation handle to staged video
#[derive(Default)]
pub struct ArtifactStore {
    entries: Mutex<HashMap<PresentationHandle, ArtifactEntry>>,
}

impl ArtifactStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a staged video under `handle`.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::Occupied` if the handle is taken; the incoming
    /// entry is released so its directory does not leak.
    pub async fn insert(
        &self,
        handle: PresentationHandle,
        entry: ArtifactEntry,
    ) -> Result<(), ArtifactError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&handle) {
            drop(entries);
            warn!(handle = %handle, "Presentation handle reused, discarding new entry");
            entry.release().await;
            return Err(ArtifactError::Occupied(handle));
        }
        debug!(handle = %handle, path = %entry.video_path().display(), "Artifact recorded");
        entries.insert(handle, entry);
        Ok(())
    }

    /// Path of the staged video for `handle`, if any
    pub async fn video_path(&self, handle: PresentationHandle) -> Option<PathBuf> {
        let entries = self.entries.lock().await;
        entries
            .get(&handle)
            .map(|entry| entry.video_path().to_path_buf())
    }

    /// Remove and return the entry for `handle`.
    ///
    /// The caller becomes responsible for releasing it.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::Expired` if no entry exists.
    pub async fn take(&self, handle: PresentationHandle) -> Result<ArtifactEntry, ArtifactError> {
        let mut entries = self.entries.lock().await;
        entries
            .remove(&handle)
            .ok_or(ArtifactError::Expired(handle))
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Release every entry older than `ttl`; returns how many were removed
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let expired: Vec<ArtifactEntry> = {
            let mut entries = self.entries.lock().await;
            let keys: Vec<PresentationHandle> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(ttl))
                .map(|(handle, _)| *handle)
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };

        let count = expired.len();
        for entry in expired {
            entry.release().await;
        }
        count
    }

    /// Release every entry; used on shutdown
    pub async fn release_all(&self) -> usize {
        let drained: Vec<ArtifactEntry> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            entry.release().await;
        }
        count
    }

    /// Run [`ArtifactStore::sweep`] every `period` until `cancel` fires
    #[must_use]
    pub fn spawn_reaper(
        self: Arc<Self>,
        ttl: Duration,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Artifact reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = self.sweep(ttl).await;
                        if removed > 0 {
                            info!(removed, "Released expired staged videos");
                        }
                    }
                }
            }
        })
    }
}
