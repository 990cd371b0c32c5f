//! Splitting long text into thread-sized parts.
//!
//! Lengths are UTF-8 byte lengths, the unit the remote service limits records by.
//! Parts are balanced: instead of filling each part up to the limit, the splitter aims
//! for `ceil(len / parts)` bytes so the thread does not end with a tiny last post.

/// How far around the target length to look for a whitespace split point, in bytes.
pub const SPLIT_WINDOW: usize = 20;

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Byte index of the last whitespace character in `s[start..end]`, if it is not at 0.
fn last_whitespace(s: &str, start: usize, end: usize) -> Option<usize> {
    let start = floor_char_boundary(s, start);
    let end = floor_char_boundary(s, end);
    if start >= end {
        return None;
    }
    s[start..end]
        .rfind(char::is_whitespace)
        .map(|i| start + i)
        .filter(|&i| i > 0)
}

/// Splits `text` into parts of at most `max_len` bytes each.
///
/// - Text that already fits is returned as a single, untouched part.
/// - Otherwise each split happens at the last whitespace within [`SPLIT_WINDOW`] bytes
///   of the balanced target length, else at the last whitespace before `max_len`, else
///   hard at `max_len` (moved back to a character boundary), which may cut a word.
/// - Every part and remainder is trimmed; empty parts are never returned.
///
/// # Example
///
/// ```rust
/// use bluesky_connector::split_text_into_parts;
///
/// let parts = split_text_into_parts("aaaa bbbb cccc", 10);
/// assert_eq!(parts, vec!["aaaa bbbb", "cccc"]);
/// assert!(parts.iter().all(|p| p.len() <= 10));
/// ```
pub fn split_text_into_parts(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let total_parts = text.len().div_ceil(max_len);
    let target_len = text.len().div_ceil(total_parts);

    let mut parts = Vec::with_capacity(total_parts);
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            parts.push(remaining.to_string());
            break;
        }

        // A whitespace at index `max_len` still leaves a part of exactly `max_len` bytes.
        let window_start = target_len.saturating_sub(SPLIT_WINDOW);
        let window_end = (target_len + SPLIT_WINDOW).min(max_len + 1);

        let split_at = last_whitespace(remaining, window_start, window_end)
            .or_else(|| last_whitespace(remaining, 0, max_len + 1))
            .unwrap_or_else(|| hard_split_index(remaining, max_len));

        let part = remaining[..split_at].trim();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        remaining = remaining[split_at..].trim();
    }

    parts
}

fn hard_split_index(s: &str, max_len: usize) -> usize {
    let index = floor_char_boundary(s, max_len);
    if index > 0 {
        return index;
    }
    // max_len is smaller than the first character; take that character whole
    s.chars().next().map(char::len_utf8).unwrap_or(s.len())
}
