//! Media pipeline building blocks
//!
//! Fetching a post through yt-dlp, deriving its caption, and turning the
//! staged video into an audio file with ffmpeg.

/// Caption sanitizing and composition
pub mod caption;
/// Media Fetcher backed by yt-dlp
pub mod fetcher;
/// Audio Transcoder backed by ffmpeg
pub mod transcoder;

pub use caption::{clean_caption, compose_caption};
pub use fetcher::{FetchError, FetchResult, MediaFetcher, YtdlpFetcher};
pub use transcoder::{audio_path_for, AudioTranscoder, FfmpegTranscoder, TranscodeFailure, TranscodeOutcome};
