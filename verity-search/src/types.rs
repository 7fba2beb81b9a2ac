use serde::{Deserialize, Serialize};

/// One candidate result returned by a search provider, with its URL already
/// canonicalized (see `verity_common::urlnorm::canonicalize`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub score: Option<f64>,
    pub published_at: Option<String>,
}

/// An inclusive `[from, to]` date range, each an ISO-8601 date string.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Options accepted by `search` and threaded down into providers.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub size: usize,
    pub time_range: Option<TimeRange>,
    pub allowed_domains: Vec<String>,
    pub disallowed_domains: Vec<String>,
    pub region: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            size: 10,
            time_range: None,
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
            region: None,
            timeout_ms: 15_000,
        }
    }
}
