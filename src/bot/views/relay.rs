//! Relay UI components
//!
//! Contains the inline keyboard attached to relayed videos and every
//! notice the bot sends back to a chat.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Callback data for requesting the audio of a relayed video
pub const AUDIO_CALLBACK: &str = "audio";
/// Label of the audio button
pub const AUDIO_BUTTON_LABEL: &str = "🎵 Download Audio";

// ─────────────────────────────────────────────────────────────────────────────
// Trait definition
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for relay notice rendering
pub trait RelayView {
    /// Transient notice while a post is being fetched
    fn fetching() -> &'static str;

    /// Generic failure of the fetch-and-present path
    fn fetch_failed() -> &'static str;

    /// The button refers to a video that is no longer staged
    fn expired() -> &'static str;

    /// Audio could not be produced or delivered
    fn audio_failed() -> &'static str;

    /// Usage text for /start and /help
    fn help(link_marker: &str) -> String;
}

/// Default view with English texts
pub struct DefaultRelayView;

impl RelayView for DefaultRelayView {
    fn fetching() -> &'static str {
        "⏳ Fetching..."
    }

    fn fetch_failed() -> &'static str {
        "❌ Failed to fetch media."
    }

    fn expired() -> &'static str {
        "❌ File expired."
    }

    fn audio_failed() -> &'static str {
        "❌ Failed to extract audio."
    }

    fn help(link_marker: &str) -> String {
        format!(
            "👋 Send me a {link_marker} link and I will reply with the video.\n\
             Press «{AUDIO_BUTTON_LABEL}» under it to get the soundtrack as MP3."
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

/// Single-button keyboard attached to every relayed video
///
/// # Examples
///
/// ```
/// use reel_relay::bot::views::audio_keyboard;
/// let keyboard = audio_keyboard();
/// assert_eq!(keyboard.inline_keyboard.len(), 1);
/// ```
#[must_use]
pub fn audio_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        AUDIO_BUTTON_LABEL,
        AUDIO_CALLBACK,
    )]])
}
