//! Text toolkit: sanitization, token estimation, paragraph/sentence
//! splitting, windowed chunking, and tolerant quote matching.
//!
//! Offsets everywhere in this module (and downstream, in `Chunk`/
//! `ClaimEvidence`) are **character** offsets, not byte offsets, since
//! Offsets throughout this module are in terms of character position
//! ("the index of \"Curie\""). All functions here are pure and total.

mod quote;
mod sanitize;
mod split;
mod tokens;

pub use quote::{find_quote_offsets, QuoteMatchOptions};
pub use sanitize::{sanitize, SanitizeOptions};
pub use split::{split_into_windows, split_paragraphs, split_sentences, Span, Window, WindowOptions};
pub use tokens::estimate_tokens;

/// Returns the byte index in `s` corresponding to the `nth` character
/// (0-based), or `s.len()` if `nth >= char_count(s)`.
pub(crate) fn char_to_byte(s: &str, nth: usize) -> usize {
    s.char_indices()
        .nth(nth)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

/// Slices `s` by character range `[start, end)`, clamped to the string's
/// length. Panics only if `start > end`.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    assert!(start <= end, "char_slice: start {start} > end {end}");
    let byte_start = char_to_byte(s, start);
    let byte_end = char_to_byte(s, end);
    &s[byte_start..byte_end]
}

/// Number of characters (not bytes) in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}
