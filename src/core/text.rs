//! Small text helpers shared across parsing, chunking, and citation building.

use unicode_segmentation::UnicodeSegmentation;

/// Estimates the token count of a text.
///
/// Uses the common approximation of ~4 characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Truncates a text to at most `max_chars` characters without splitting
/// grapheme clusters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    let mut count = 0;
    for (offset, grapheme) in text.grapheme_indices(true) {
        let chars = grapheme.chars().count();
        if count + chars > max_chars {
            return &text[..offset];
        }
        count += chars;
    }
    text
}

/// Finds a valid UTF-8 character boundary at or before the given byte position.
#[must_use]
pub fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut boundary = pos;
    while !s.is_char_boundary(boundary) && boundary > 0 {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(2048)), 512);
    }

    #[test]
    fn test_truncate_chars_short_input() {
        assert_eq!(truncate_chars("hello", 300), "hello");
    }

    #[test]
    fn test_truncate_chars_limits() {
        let text = "abcdef";
        assert_eq!(truncate_chars(text, 3), "abc");
        assert_eq!(truncate_chars(text, 0), "");
    }

    #[test]
    fn test_truncate_chars_keeps_graphemes_whole() {
        // Family emoji is a single grapheme built from several chars.
        let text = "ab\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F466}cd";
        let truncated = truncate_chars(text, 3);
        assert_eq!(truncated, "ab");
    }

    #[test]
    fn test_find_char_boundary() {
        let s = "héllo";
        // Byte 2 is inside the two-byte 'é'.
        assert_eq!(find_char_boundary(s, 2), 1);
        assert_eq!(find_char_boundary(s, 100), s.len());
    }
}
