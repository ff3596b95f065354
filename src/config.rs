//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the defaults of the media pipeline.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Substring a message must contain to be treated as a media link
pub const DEFAULT_LINK_MARKER: &str = "instagram.com";
/// Resolution ceiling for the fetched video stream
pub const DEFAULT_MAX_VIDEO_HEIGHT: u32 = 720;
/// Bitrate of the derived audio file
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 192;
/// Upper bound for a single yt-dlp run
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
/// Upper bound for a single ffmpeg run
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 300;
/// Lease length of a staged video (1 hour)
pub const DEFAULT_ARTIFACT_TTL_SECS: u64 = 3600;
/// Period of the background reaper (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default)]
    pub telegram_token: String,

    /// Substring that marks a message as a supported link
    #[serde(default = "default_link_marker")]
    pub link_marker: String,

    /// Maximum video height requested from yt-dlp
    #[serde(default = "default_max_video_height")]
    pub max_video_height: u32,

    /// Audio bitrate in kbit/s
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,

    /// Path to the yt-dlp binary
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Path to the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Timeout for a fetch in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Timeout for a transcode in seconds
    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,

    /// How long a staged video waits for the audio button
    #[serde(default = "default_artifact_ttl_secs")]
    pub artifact_ttl_secs: u64,

    /// How often expired staged videos are swept
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Directory under which per-request staging directories are created
    pub staging_root: Option<PathBuf>,
}

fn default_link_marker() -> String {
    DEFAULT_LINK_MARKER.to_string()
}

const fn default_max_video_height() -> u32 {
    DEFAULT_MAX_VIDEO_HEIGHT
}

const fn default_audio_bitrate_kbps() -> u32 {
    DEFAULT_AUDIO_BITRATE_KBPS
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

const fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

const fn default_transcode_timeout_secs() -> u64 {
    DEFAULT_TRANSCODE_TIMEOUT_SECS
}

const fn default_artifact_ttl_secs() -> u64 {
    DEFAULT_ARTIFACT_TTL_SECS
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `APP__LINK_MARKER=tiktok.com ./target/reel-relay`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE env vars map to snake_case keys, empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reel_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or no bot token is configured.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Fallback: the token is commonly exported as BOT_TOKEN
        if settings.telegram_token.is_empty() {
            if let Ok(val) = std::env::var("BOT_TOKEN") {
                if !val.is_empty() {
                    settings.telegram_token = val;
                }
            }
        }

        if settings.telegram_token.is_empty() {
            return Err(ConfigError::NotFound(
                "telegram_token (TELEGRAM_TOKEN or BOT_TOKEN)".to_string(),
            ));
        }

        Ok(settings)
    }

    /// Directory under which staging directories are created
    #[must_use]
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Fetch timeout as a `Duration`
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Transcode timeout as a `Duration`
    #[must_use]
    pub const fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    /// Lease length of a staged video as a `Duration`
    #[must_use]
    pub const fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    /// Reaper period as a `Duration`; never zero
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Environment variables are process-global, so everything lives in one test
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        // 1. Token from TELEGRAM_TOKEN, defaults elsewhere
        env::remove_var("BOT_TOKEN");
        env::set_var("TELEGRAM_TOKEN", "dummy_token");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(settings.link_marker, DEFAULT_LINK_MARKER);
        assert_eq!(settings.max_video_height, 720);
        assert_eq!(settings.audio_bitrate_kbps, 192);
        assert_eq!(settings.staging_root(), env::temp_dir());

        env::remove_var("TELEGRAM_TOKEN");

        // 2. BOT_TOKEN fallback
        env::set_var("BOT_TOKEN", "fallback_token");
        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "fallback_token");
        env::remove_var("BOT_TOKEN");

        // 3. Empty token is the same as no token
        env::set_var("TELEGRAM_TOKEN", "");
        assert!(matches!(Settings::new(), Err(ConfigError::NotFound(_))));
        env::remove_var("TELEGRAM_TOKEN");

        // 4. Overrides
        env::set_var("TELEGRAM_TOKEN", "dummy");
        env::set_var("LINK_MARKER", "tiktok.com");
        env::set_var("ARTIFACT_TTL_SECS", "60");
        let settings = Settings::new()?;
        assert_eq!(settings.link_marker, "tiktok.com");
        assert_eq!(settings.artifact_ttl(), Duration::from_secs(60));
        env::remove_var("LINK_MARKER");
        env::remove_var("ARTIFACT_TTL_SECS");
        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let settings = Settings {
            telegram_token: "dummy".to_string(),
            link_marker: default_link_marker(),
            max_video_height: DEFAULT_MAX_VIDEO_HEIGHT,
            audio_bitrate_kbps: DEFAULT_AUDIO_BITRATE_KBPS,
            ytdlp_path: default_ytdlp_path(),
            ffmpeg_path: default_ffmpeg_path(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            transcode_timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
            artifact_ttl_secs: DEFAULT_ARTIFACT_TTL_SECS,
            sweep_interval_secs: 0,
            staging_root: Some(PathBuf::from("/var/tmp/relay")),
        };

        assert_eq!(settings.sweep_interval(), Duration::from_secs(1));
        assert_eq!(settings.staging_root(), PathBuf::from("/var/tmp/relay"));
    }
}
