//! Hashtag detection for rich-text facets.
//!
//! Facet offsets are UTF-8 byte offsets into the exact text of the record they are
//! attached to, so detection must run on each final post text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::models::Facet;

/// Longest accepted hashtag, `#` included, in bytes.
pub const MAX_HASHTAG_BYTES: usize = 66;

const TRAILING_PUNCTUATION: [char; 9] = ['.', ',', ';', '!', '?', ':', ')', ']', '}'];

// `#` at start of text or after whitespace, then a non-digit non-space character,
// then the rest of the non-space run.
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(#[^0-9\s]\S*)").expect("hashtag pattern is valid")
});

/// Finds hashtags in `text` and returns one tag facet per hashtag, in text order.
///
/// Trailing punctuation is not part of a tag (`#GitHub!` yields `GitHub`). Tags longer
/// than [`MAX_HASHTAG_BYTES`] or empty after stripping are skipped.
///
/// # Example
///
/// ```rust
/// use bluesky_connector::detect_hashtags;
///
/// let facets = detect_hashtags("Hello #GitHub world");
/// assert_eq!(facets.len(), 1);
/// assert_eq!(facets[0].byte_start(), 6);
/// assert_eq!(facets[0].byte_end(), 13);
/// assert_eq!(facets[0].tag_value(), Some("GitHub"));
/// ```
pub fn detect_hashtags(text: &str) -> Vec<Facet> {
    HASHTAG_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| {
            let tag = strip_trailing_punctuation(m.as_str());
            let value = &tag[1..];
            if tag.len() > MAX_HASHTAG_BYTES || value.is_empty() {
                return None;
            }
            Some(Facet::tag(m.start(), m.start() + tag.len(), value))
        })
        .collect()
}

pub(crate) fn strip_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(&TRAILING_PUNCTUATION[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(text: &str) -> Vec<(String, usize, usize)> {
        detect_hashtags(text)
            .iter()
            .map(|f| {
                (
                    f.tag_value().unwrap().to_string(),
                    f.byte_start(),
                    f.byte_end(),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_hashtag() {
        assert_eq!(spans("Hello #GitHub world"), vec![("GitHub".to_string(), 6, 13)]);
    }

    #[test]
    fn test_multiple_hashtags() {
        assert_eq!(
            spans("Check out #GitHub and #OpenSource projects"),
            vec![("GitHub".to_string(), 10, 17), ("OpenSource".to_string(), 22, 33)]
        );
    }

    #[test]
    fn test_hashtag_at_start_and_end() {
        assert_eq!(spans("#GitHub is awesome"), vec![("GitHub".to_string(), 0, 7)]);
        assert_eq!(spans("Posted on #GitHub"), vec![("GitHub".to_string(), 10, 17)]);
    }

    #[test]
    fn test_trailing_punctuation_is_excluded() {
        assert_eq!(
            spans("Check #GitHub! It's great."),
            vec![("GitHub".to_string(), 6, 13)]
        );
        assert_eq!(spans("(see #rust)."), vec![("rust".to_string(), 5, 10)]);
        assert_eq!(spans("see #rust).")[0], ("rust".to_string(), 4, 9));
    }

    #[test]
    fn test_rejected_candidates() {
        assert!(detect_hashtags("Just plain text without tags").is_empty());
        assert!(detect_hashtags("This #123test should not match").is_empty());
        assert!(detect_hashtags("lonely # sign").is_empty());
        assert!(detect_hashtags("only punctuation #!?").is_empty());
        assert!(detect_hashtags("mid-word a#tag").is_empty());
    }

    #[test]
    fn test_newlines_count_as_whitespace() {
        assert_eq!(
            spans("First line #GitHub\n\nSecond line #OpenSource"),
            vec![("GitHub".to_string(), 11, 18), ("OpenSource".to_string(), 32, 43)]
        );
    }

    #[test]
    fn test_offsets_are_bytes_after_multibyte_prefix() {
        assert_eq!(
            spans("🧵 1/2 Some content\n\n#GitHub #OpenSource"),
            vec![("GitHub".to_string(), 23, 30), ("OpenSource".to_string(), 31, 42)]
        );
        assert_eq!(spans("café #thé"), vec![("thé".to_string(), 6, 11)]);
    }

    #[test]
    fn test_length_limit() {
        let accepted = format!("#{}", "a".repeat(65));
        assert_eq!(accepted.len(), 66);
        assert_eq!(detect_hashtags(&accepted).len(), 1);

        let rejected = format!("#{}", "a".repeat(66));
        assert!(detect_hashtags(&rejected).is_empty());

        // punctuation is stripped before the length check
        let with_bang = format!("{}!", accepted);
        assert_eq!(spans(&with_bang), vec![("a".repeat(65), 0, 66)]);
    }

    #[test]
    fn test_strip_trailing_punctuation() {
        assert_eq!(strip_trailing_punctuation("#GitHub"), "#GitHub");
        assert_eq!(strip_trailing_punctuation("#GitHub!"), "#GitHub");
        assert_eq!(strip_trailing_punctuation("#GitHub!?"), "#GitHub");
        assert_eq!(strip_trailing_punctuation("#GitHub."), "#GitHub");
        assert_eq!(strip_trailing_punctuation("#GitHub,"), "#GitHub");
    }
}
