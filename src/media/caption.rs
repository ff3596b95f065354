//! Caption derivation for relayed videos.
//!
//! Descriptions coming from the source are full of hashtags and mentions;
//! they are stripped before the text is shown under the re-served video.

// lazy_regex! keeps once_cell statics, validated at compile time
#![allow(clippy::non_std_lazy_statics)]

use super::fetcher::FetchResult;
use crate::utils::{truncate_utf16, utf16_len};
use lazy_regex::lazy_regex;

/// Telegram's limit for media captions, in UTF-16 code units
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Match hashtags: #word
static RE_HASHTAG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"#\w+");

/// Match mentions: @word
static RE_MENTION: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"@\w+");

/// Removes hashtags and mentions from a description and trims the result.
///
/// Absent input yields an empty string. Sanitizing an already sanitized
/// string returns it unchanged.
///
/// # Examples
///
/// ```
/// use reel_relay::media::clean_caption;
/// assert_eq!(
///     clean_caption(Some("Check this out #cool @friend see link")),
///     "Check this out   see link"
/// );
/// assert_eq!(clean_caption(None), "");
/// ```
#[must_use]
pub fn clean_caption(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let without_tags = RE_HASHTAG.replace_all(text, "");
    let without_mentions = RE_MENTION.replace_all(&without_tags, "");
    without_mentions.trim().to_string()
}

/// Builds the caption shown under a relayed video.
///
/// Layout: uploader handle, track label, the message that carried the link,
/// a blank line, then the sanitized description. The description is shortened
/// to fit the Telegram caption limit; the header is only cut when it alone
/// exceeds the limit.
#[must_use]
pub fn compose_caption(fetched: &FetchResult, source_text: &str) -> String {
    let header = format!(
        "@{}\n🎵 Song: {}\n🔗 Source: {}\n\n",
        fetched.uploader, fetched.track, source_text
    );
    let budget = TELEGRAM_CAPTION_LIMIT.saturating_sub(utf16_len(&header));
    if budget == 0 {
        return truncate_utf16(header, TELEGRAM_CAPTION_LIMIT);
    }

    let description = clean_caption(fetched.description.as_deref());
    header + &truncate_utf16(description, budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn fetched(description: Option<&str>) -> FetchResult {
        FetchResult {
            video_path: PathBuf::from("/tmp/reel/clip.mp4"),
            uploader: "alice".to_string(),
            track: "Unknown".to_string(),
            description: description.map(str::to_string),
            source_url: "https://instagram.com/p/abc123".to_string(),
        }
    }

    #[test]
    fn test_clean_caption_removes_tags_and_mentions() {
        assert_eq!(
            clean_caption(Some("Check this out #cool @friend see link")),
            "Check this out   see link"
        );
    }

    #[test]
    fn test_clean_caption_absent_and_empty() {
        assert_eq!(clean_caption(None), "");
        assert_eq!(clean_caption(Some("")), "");
        assert_eq!(clean_caption(Some("   #only @tags  ")), "");
    }

    #[test]
    fn test_clean_caption_unicode_words() {
        assert_eq!(clean_caption(Some("Море #лето @друг")), "Море");
    }

    #[test]
    fn test_compose_caption_layout() {
        let caption = compose_caption(
            &fetched(Some("#fun day out @bob")),
            "look at https://instagram.com/p/abc123",
        );
        assert_eq!(
            caption,
            "@alice\n🎵 Song: Unknown\n🔗 Source: look at https://instagram.com/p/abc123\n\nday out"
        );
    }

    #[test]
    fn test_compose_caption_without_description() {
        let caption = compose_caption(&fetched(None), "https://instagram.com/p/abc123");
        assert!(caption.ends_with("🔗 Source: https://instagram.com/p/abc123\n\n"));
    }

    #[test]
    fn test_compose_caption_respects_limit() {
        let long = "word ".repeat(600);
        let caption = compose_caption(&fetched(Some(&long)), "https://instagram.com/p/abc123");
        assert_eq!(utf16_len(&caption), TELEGRAM_CAPTION_LIMIT);
        assert!(caption.starts_with("@alice\n🎵 Song: Unknown\n"));
    }

    #[test]
    fn test_compose_caption_limit_counts_utf16_for_devanagari() {
        let long = "नमस्ते दोस्तों ".repeat(150);
        let caption = compose_caption(&fetched(Some(&long)), "https://instagram.com/p/abc123");
        assert!(utf16_len(&caption) <= TELEGRAM_CAPTION_LIMIT);
        assert!(caption.contains("🔗 Source: https://instagram.com/p/abc123\n\nनमस्ते"));
    }

    #[test]
    fn test_compose_caption_limit_with_zwj_emoji() {
        let long = "👨\u{200d}👩\u{200d}👧 ".repeat(200);
        let caption = compose_caption(&fetched(Some(&long)), "https://instagram.com/p/abc123");
        assert!(utf16_len(&caption) <= TELEGRAM_CAPTION_LIMIT);
        // no sequence is split mid-way
        assert!(!caption.ends_with('\u{200d}'));
        assert!(caption.trim_end().ends_with('👧'));
    }

    #[test]
    fn test_compose_caption_oversized_source_text() {
        let source = format!("https://instagram.com/p/abc123 {}", "x".repeat(2000));
        let caption = compose_caption(&fetched(Some("day out")), &source);
        assert_eq!(utf16_len(&caption), TELEGRAM_CAPTION_LIMIT);
        assert!(caption.starts_with("@alice\n"));
    }

    proptest! {
        #[test]
        fn prop_no_tags_survive(input in "\\PC{0,64}") {
            let cleaned = clean_caption(Some(&input));
            prop_assert!(!RE_HASHTAG.is_match(&cleaned));
            prop_assert!(!RE_MENTION.is_match(&cleaned));
        }

        #[test]
        fn prop_idempotent(input in "[a-z #@_\\t]{0,48}") {
            let once = clean_caption(Some(&input));
            let twice = clean_caption(Some(&once));
            prop_assert_eq!(once, twice);
        }
    }
}
