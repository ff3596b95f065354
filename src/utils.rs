//! Small text helpers shared by the media pipeline.

use unicode_segmentation::UnicodeSegmentation;

/// Length of a string as Telegram counts it: UTF-16 code units.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Truncates a string to at most `max_units` UTF-16 code units.
///
/// Cuts only on grapheme cluster boundaries, so an emoji sequence or a
/// letter with its combining marks is either kept whole or dropped whole.
///
/// # Examples
///
/// ```
/// use reel_relay::utils::truncate_utf16;
/// assert_eq!(truncate_utf16("Привет, мир!", 6), "Привет");
/// // 🎵 is two UTF-16 units
/// assert_eq!(truncate_utf16("🎵🎵🎵", 5), "🎵🎵");
/// ```
#[must_use]
pub fn truncate_utf16(s: impl AsRef<str>, max_units: usize) -> String {
    let s = s.as_ref();
    let mut used = 0;
    for (pos, grapheme) in s.grapheme_indices(true) {
        used += utf16_len(grapheme);
        if used > max_units {
            return s[..pos].to_string();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_cyrillic() {
        let s = "Привет, мир!";
        assert_eq!(truncate_utf16(s, 6), "Привет");
        assert_eq!(truncate_utf16(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_truncate_counts_surrogate_pairs() {
        assert_eq!(utf16_len("🎵"), 2);
        assert_eq!(truncate_utf16("🎵🎵🎵", 4), "🎵🎵");
        assert_eq!(truncate_utf16("🎵🎵🎵", 3), "🎵");
    }

    #[test]
    fn test_truncate_keeps_zwj_sequence_whole() {
        // family emoji: 7 code points, 11 UTF-16 units, one grapheme
        let family = "👨\u{200d}👩\u{200d}👧\u{200d}👦";
        assert_eq!(utf16_len(family), 11);
        assert_eq!(truncate_utf16(format!("a{family}"), 10), "a");
        assert_eq!(truncate_utf16(format!("a{family}"), 12), format!("a{family}"));
    }

    #[test]
    fn test_truncate_devanagari_within_budget() {
        let text = "नमस्ते दोस्तों ".repeat(40);
        let cut = truncate_utf16(&text, 100);
        assert!(utf16_len(&cut) <= 100);
        assert!(text.starts_with(&cut));
    }

    #[test]
    fn test_truncate_exact_length() {
        assert_eq!(truncate_utf16("abc", 3), "abc");
        assert_eq!(truncate_utf16("", 3), "");
        assert_eq!(truncate_utf16("abc", 0), "");
    }
}
