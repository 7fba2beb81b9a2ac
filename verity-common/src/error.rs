use thiserror::Error;

/// Core internal error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Upstream transient error: {0}")]
    UpstreamTransient(String),
    #[error("Upstream error: {0}")]
    UpstreamNonRetryable(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("LLM rate limited / too large: {0}")]
    LlmBudgetExceeded(String),
    #[error("LLM parsing error: {0}")]
    LlmParsing(String),
    #[error("Binary content rejected: {0}")]
    BinaryContent(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors considered transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamTransient(_) | Self::Timeout(_))
    }
}
