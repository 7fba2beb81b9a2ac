use serde::{Deserialize, Serialize};
use verity_common::config::AppConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    Normal,
    Deep,
}

impl Default for Depth {
    fn default() -> Self {
        Self::Normal
    }
}

impl Depth {
    /// Subquery cap: deep:6, normal:4, quick:3.
    pub fn max_subqueries(self) -> usize {
        match self {
            Self::Quick => 3,
            Self::Normal => 4,
            Self::Deep => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Normal => "normal",
            Self::Deep => "deep",
        }
    }
}

/// Tunables for one orchestrator run, derived from `AppConfig` plus the
/// per-request depth/constraint fields.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub inline_cap: usize,
    pub search_concurrency: usize,
    pub read_concurrency: usize,
    pub rank_cap: usize,
    pub rank_per_query_take: i64,
    pub rank_per_source_limit: usize,
    pub enable_rerank: bool,
    pub answer_input_budget_tokens: usize,
    pub answer_prompt_overhead_tokens: usize,
    pub answer_max_chars_per_chunk: usize,
    pub verify_input_budget_tokens: usize,
    pub verify_prompt_overhead_tokens: usize,
    pub verify_max_chars_per_chunk: usize,
    pub verify_hard_ceiling_tokens: usize,
    pub skip_verify_on_tpm: bool,
    pub request_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inline_cap: 12,
            search_concurrency: 3,
            read_concurrency: 3,
            rank_cap: 24,
            rank_per_query_take: 20,
            rank_per_source_limit: 3,
            enable_rerank: false,
            answer_input_budget_tokens: 3200,
            answer_prompt_overhead_tokens: 800,
            answer_max_chars_per_chunk: 900,
            verify_input_budget_tokens: 1500,
            verify_prompt_overhead_tokens: 500,
            verify_max_chars_per_chunk: 350,
            verify_hard_ceiling_tokens: 5000,
            skip_verify_on_tpm: true,
            request_timeout_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            inline_cap: cfg.max_sources_inline,
            enable_rerank: cfg.enable_rerank,
            answer_input_budget_tokens: cfg.answer_input_budget_tokens,
            answer_prompt_overhead_tokens: cfg.answer_prompt_overhead_tokens,
            answer_max_chars_per_chunk: cfg.answer_max_chars_per_chunk,
            verify_input_budget_tokens: cfg.verify_input_budget_tokens,
            verify_prompt_overhead_tokens: cfg.verify_prompt_overhead_tokens,
            skip_verify_on_tpm: cfg.skip_verify_on_tpm,
            request_timeout_ms: cfg.request_timeout_ms,
            read_concurrency: cfg.reader_concurrency.clamp(2, 4),
            ..Default::default()
        }
    }
}
