use super::{char_len, char_slice};
use super::tokens::estimate_tokens;

/// A non-empty slice of text with its character offsets into the source
/// string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// A windowed chunk of text produced by `split_into_windows`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub approx_tokens: usize,
}

/// Splits `s` into non-empty paragraphs (runs separated by one or more
/// blank lines), returning character-offset spans.
pub fn split_paragraphs(s: &str) -> Vec<Span> {
    split_by_blank_runs(s)
        .into_iter()
        .filter(|span| !span.text.trim().is_empty())
        .collect()
}

fn split_by_blank_runs(s: &str) -> Vec<Span> {
    let chars: Vec<char> = s.chars().collect();
    let mut spans = Vec::new();
    let mut i = 0usize;
    let n = chars.len();

    while i < n {
        while i < n && is_blank_run_start(&chars, i) {
            i += 1;
        }
        if i >= n {
            break;
        }
        let start = i;
        while i < n && !is_blank_run_start(&chars, i) {
            i += 1;
        }
        let end = i;
        let text = chars[start..end].iter().collect::<String>();
        spans.push(Span { text, start, end });
    }
    spans
}

fn is_blank_run_start(chars: &[char], i: usize) -> bool {
    chars[i] == '\n' && chars.get(i + 1) == Some(&'\n')
}

/// Splits `s` into non-empty sentences using a conservative heuristic:
/// break after `.`, `!`, or `?` followed by whitespace and an uppercase
/// letter or end of string, returning character-offset spans.
pub fn split_sentences(s: &str) -> Vec<Span> {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < n {
        let c = chars[i];
        if c == '.' || c == '!' || c == '?' {
            let mut j = i + 1;
            while j < n && chars[j].is_whitespace() {
                j += 1;
            }
            let boundary = j >= n || chars[j].is_uppercase() || chars[j] == '"' || chars[j] == '\u{201C}';
            if boundary {
                let text = chars[start..j].trim_span();
                if let Some((text, rel_start, rel_end)) = text {
                    spans.push(Span {
                        text,
                        start: start + rel_start,
                        end: start + rel_end,
                    });
                }
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if start < n {
        let text = chars[start..n].trim_span();
        if let Some((text, rel_start, rel_end)) = text {
            spans.push(Span {
                text,
                start: start + rel_start,
                end: start + rel_end,
            });
        }
    }

    spans
}

trait TrimSpan {
    fn trim_span(&self) -> Option<(String, usize, usize)>;
}

impl TrimSpan for [char] {
    fn trim_span(&self) -> Option<(String, usize, usize)> {
        let first = self.iter().position(|c| !c.is_whitespace())?;
        let last = self.iter().rposition(|c| !c.is_whitespace())?;
        if first > last {
            return None;
        }
        Some((self[first..=last].iter().collect(), first, last + 1))
    }
}

/// Options controlling `split_into_windows`.
#[derive(Clone, Copy, Debug)]
pub struct WindowOptions {
    pub target_tokens: usize,
    pub overlap_ratio: f64,
    pub respect_paragraphs: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            target_tokens: 1000,
            overlap_ratio: 0.15,
            respect_paragraphs: true,
        }
    }
}

/// Splits `s` into overlapping windows targeting `opts.target_tokens`
/// estimated tokens each, overlapping consecutive windows by
/// `opts.overlap_ratio` of the target, preferring to break on paragraph
/// boundaries when `opts.respect_paragraphs` is set.
///
/// If `|s|` (in characters) is small enough that a single window already
/// covers the whole estimated-token budget, returns exactly one window
/// spanning `[0, char_len(s))`.
pub fn split_into_windows(s: &str, opts: WindowOptions) -> Vec<Window> {
    let total_chars = char_len(s);
    if total_chars == 0 {
        return Vec::new();
    }

    if estimate_tokens(s) <= opts.target_tokens {
        return vec![Window {
            text: s.to_string(),
            char_start: 0,
            char_end: total_chars,
            approx_tokens: estimate_tokens(s),
        }];
    }

    let boundaries = if opts.respect_paragraphs {
        let mut b: Vec<usize> = split_paragraphs(s).iter().map(|p| p.start).collect();
        b.push(total_chars);
        if b.first() != Some(&0) {
            b.insert(0, 0);
        }
        b
    } else {
        vec![0, total_chars]
    };

    // Approximate chars-per-target-token using the global ratio of this text.
    let chars_per_token = total_chars as f64 / estimate_tokens(s).max(1) as f64;
    let target_chars = (opts.target_tokens as f64 * chars_per_token).round() as usize;
    let overlap_chars = (target_chars as f64 * opts.overlap_ratio).round() as usize;

    let mut windows = Vec::new();
    let mut cursor = 0usize;

    while cursor < total_chars {
        let naive_end = (cursor + target_chars).min(total_chars);
        let end = if naive_end >= total_chars {
            total_chars
        } else if opts.respect_paragraphs {
            nearest_boundary_at_or_before(&boundaries, naive_end).unwrap_or(naive_end)
        } else {
            naive_end
        };
        let end = if end <= cursor { naive_end } else { end };
        let end = end.max(cursor + 1).min(total_chars);

        let text = char_slice(s, cursor, end).to_string();
        let approx_tokens = estimate_tokens(&text);
        windows.push(Window {
            text,
            char_start: cursor,
            char_end: end,
            approx_tokens,
        });

        if end >= total_chars {
            break;
        }
        let next = end.saturating_sub(overlap_chars);
        cursor = if next > cursor { next } else { end };
    }

    windows
}

fn nearest_boundary_at_or_before(boundaries: &[usize], pos: usize) -> Option<usize> {
    boundaries
        .iter()
        .copied()
        .filter(|&b| b > 0 && b <= pos)
        .max()
}
