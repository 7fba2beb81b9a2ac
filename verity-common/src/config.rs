use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Process-wide configuration, loaded once at startup.
///
/// Everything is optional except the LLM provider key,
/// with documented defaults applied via `serde(default = ...)`.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub llm_api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default)]
    pub search_api_key: Option<String>,
    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,
    #[serde(default)]
    pub search_fallback_api_key: Option<String>,
    #[serde(default)]
    pub search_fallback_base_url: Option<String>,
    #[serde(default)]
    pub reader_api_key: Option<String>,
    #[serde(default)]
    pub reader_base_url: Option<String>,
    #[serde(default)]
    pub rerank_api_key: Option<String>,
    #[serde(default = "default_rerank_pool_size")]
    pub rerank_pool_size: usize,

    #[serde(default = "default_plan_model")]
    pub plan_model: String,
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    #[serde(default = "default_verify_model")]
    pub verify_model: String,
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_sources_inline")]
    pub max_sources_inline: usize,
    #[serde(default)]
    pub enable_rerank: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_answer_input_budget_tokens")]
    pub answer_input_budget_tokens: usize,
    #[serde(default = "default_answer_prompt_overhead_tokens")]
    pub answer_prompt_overhead_tokens: usize,
    #[serde(default = "default_answer_max_chars_per_chunk")]
    pub answer_max_chars_per_chunk: usize,
    #[serde(default = "default_verify_input_budget_tokens")]
    pub verify_input_budget_tokens: usize,
    #[serde(default = "default_verify_prompt_overhead_tokens")]
    pub verify_prompt_overhead_tokens: usize,
    #[serde(default = "default_true")]
    pub skip_verify_on_tpm: bool,

    #[serde(default)]
    pub reader_prefer: ReaderPrefer,
    #[serde(default)]
    pub reader_raw_domains: Vec<String>,
    #[serde(default = "default_reader_concurrency")]
    pub reader_concurrency: usize,

    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
}

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReaderPrefer {
    #[default]
    Primary,
    Raw,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_search_base_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}
fn default_rerank_pool_size() -> usize {
    verity_ranker_default_pool_size()
}
/// Mirrors `RerankerPool::default_pool_size` without a dependency on
/// `verity-ranker` (which would create a cycle); capped the same way.
fn verity_ranker_default_pool_size() -> usize {
    std::thread::available_parallelism().map(|n| n.get().min(2)).unwrap_or(2).max(1)
}
fn default_plan_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_answer_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_verify_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_reasoning_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_db_path() -> String {
    "./data/verity.db".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_max_sources_inline() -> usize {
    12
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_answer_input_budget_tokens() -> usize {
    3200
}
fn default_answer_prompt_overhead_tokens() -> usize {
    800
}
fn default_answer_max_chars_per_chunk() -> usize {
    900
}
fn default_verify_input_budget_tokens() -> usize {
    1500
}
fn default_verify_prompt_overhead_tokens() -> usize {
    500
}
fn default_true() -> bool {
    true
}
fn default_reader_concurrency() -> usize {
    2
}
fn default_ingest_max_body_bytes() -> usize {
    10_000_000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_prefer_defaults_to_primary() {
        assert_eq!(ReaderPrefer::default(), ReaderPrefer::Primary);
    }
}
