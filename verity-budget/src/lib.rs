//! Token-budget arithmetic for trimming ranked chunks down to a size an LLM
//! prompt can afford.

use verity_common::text::{char_len, char_slice, estimate_tokens};

/// The subset of a ranked chunk the budgeter needs: enough to measure and
/// identify it, without depending on `verity-ranker`'s richer hit type.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetChunk {
    pub id: String,
    pub source_id: String,
    pub text: String,
}

/// Smallest cap the budgeter will ever enforce, regardless of how small
/// `budget_tokens - reserve` comes out.
const MIN_EFFECTIVE_CAP: usize = 300;

/// Keeps chunks from the front of `chunks` until adding the next one would
/// push the running token estimate past `max(300, budget_tokens - reserve)`.
/// Always keeps at least one chunk when `chunks` is non-empty.
pub fn trim_chunks_to_budget(
    chunks: Vec<BudgetChunk>,
    budget_tokens: usize,
    reserve: usize,
) -> Vec<BudgetChunk> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let cap = budget_tokens.saturating_sub(reserve).max(MIN_EFFECTIVE_CAP);

    let mut kept = Vec::with_capacity(chunks.len());
    let mut running = 0usize;
    for chunk in chunks {
        let tokens = estimate_tokens(&chunk.text);
        if !kept.is_empty() && running + tokens > cap {
            break;
        }
        running += tokens;
        kept.push(chunk);
    }
    kept
}

/// Returns `text` unchanged if it already fits within `max_chars` characters;
/// otherwise keeps the first 70% and last 30% of the budget, joined by an
/// ellipsis marker line, so both the opening context and a likely citation
/// near the end survive the cut.
pub fn shrink_chunk_text(text: &str, max_chars: usize) -> String {
    let len = char_len(text);
    if len <= max_chars {
        return text.to_string();
    }

    let head_chars = (max_chars * 7) / 10;
    let tail_chars = max_chars.saturating_sub(head_chars);

    let head = char_slice(text, 0, head_chars);
    let tail = char_slice(text, len - tail_chars, len);
    format!("{head}\n\n[... truncated ...]\n\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> BudgetChunk {
        BudgetChunk {
            id: id.to_string(),
            source_id: "src-1".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(trim_chunks_to_budget(Vec::new(), 1000, 100).is_empty());
    }

    #[test]
    fn keeps_at_least_one_chunk_even_if_it_alone_exceeds_the_cap() {
        let huge = "word ".repeat(2000);
        let chunks = vec![chunk("c1", &huge)];
        let kept = trim_chunks_to_budget(chunks, 100, 50);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn stops_before_exceeding_the_effective_cap() {
        let short = "one two three four five ".repeat(4);
        let chunks = vec![
            chunk("c1", &short),
            chunk("c2", &short),
            chunk("c3", &short),
        ];
        let per_chunk = estimate_tokens(&short);
        let cap = per_chunk * 2 + 1;
        let kept = trim_chunks_to_budget(chunks, cap, 0);
        assert!(kept.len() < 3);
        assert!(!kept.is_empty());
    }

    #[test]
    fn effective_cap_never_drops_below_the_floor() {
        let chunks = vec![chunk("c1", "short text")];
        // reserve exceeds budget; cap should clamp to MIN_EFFECTIVE_CAP, not
        // go negative or zero.
        let kept = trim_chunks_to_budget(chunks, 100, 5000);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn shrink_preserves_text_at_or_under_the_limit() {
        assert_eq!(shrink_chunk_text("hello", 10), "hello");
        assert_eq!(shrink_chunk_text("hello", 5), "hello");
    }

    #[test]
    fn shrink_keeps_both_ends_of_longer_text() {
        let text = "A".repeat(50) + &"B".repeat(50);
        let shrunk = shrink_chunk_text(&text, 40);
        assert!(shrunk.starts_with("AAAA"));
        assert!(shrunk.ends_with("BBBB"));
        assert!(shrunk.contains("truncated"));
    }
}
