//! Bounded excerpts of external tool output.

/// Default maximum length, in characters, of a persisted excerpt.
pub const DEFAULT_EXCERPT_LIMIT: usize = 2000;

const ELLIPSIS: &str = "...";

/// Trims `text` and caps it at `limit` characters.
///
/// Truncated excerpts end with `...` and still fit within `limit`.
/// Blank input yields `None`.
pub fn bounded(text: &str, limit: usize) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= limit {
        return Some(text.to_string());
    }

    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut excerpt: String = text.chars().take(keep).collect();
    if limit >= ELLIPSIS.len() {
        excerpt.push_str(ELLIPSIS);
    }
    Some(excerpt)
}

/// Excerpt of a failed command's output: stderr when it has content,
/// stdout otherwise.
pub fn from_output(stderr: &str, stdout: &str, limit: usize) -> Option<String> {
    bounded(stderr, limit).or_else(|| bounded(stdout, limit))
}
