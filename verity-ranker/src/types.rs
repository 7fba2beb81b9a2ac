use serde::{Deserialize, Serialize};

/// A chunk hit after BM25 scoring, optional rerank, merge-by-max across
/// queries, and per-source diversification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RankedHit {
    pub id: String,
    pub source_id: String,
    pub text: String,
    pub score: f64,
    pub bm25: Option<f64>,
    pub snippet: Option<String>,
}

/// Tunables for `rank_for_queries`.
#[derive(Clone, Copy, Debug)]
pub struct RankOptions {
    /// Final result size after diversification.
    pub cap: usize,
    /// Max hits pulled per subquery before merging.
    pub per_query_take: i64,
    /// Max hits kept per source in the diversified result.
    pub per_source_limit: usize,
    pub enable_rerank: bool,
    pub timeout_ms: u64,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            cap: 24,
            per_query_take: 20,
            per_source_limit: 3,
            enable_rerank: false,
            timeout_ms: 15_000,
        }
    }
}

const SNIPPET_CHARS: usize = 240;

pub(crate) fn snippet_of(text: &str) -> Option<String> {
    let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
    if snippet.is_empty() {
        None
    } else {
        Some(snippet)
    }
}
