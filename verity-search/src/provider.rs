use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use verity_common::error::AppError;

use crate::types::{SearchOptions, SearchResult};

/// A pluggable search backend. Concrete vendor integrations (a specific web
/// search API) live behind this trait so the adapter's retry/fallback/
/// filter logic is vendor-agnostic and testable with fakes.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, AppError>;

    /// Provider name for logging/diagnostics.
    fn name(&self) -> &'static str;
}

/// Configuration for an HTTP JSON search API.
#[derive(Clone, Debug)]
pub struct HttpSearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Default provider backed by a generic HTTP JSON search API: `GET
/// {base_url}?q=...&count=...` returning `{results: [{url,title,snippet,
/// score,published_at}]}`. Concrete vendors differ only in request/response
/// shape, so this impl is intentionally generic rather than tied to one API.
pub struct HttpSearchProvider {
    client: reqwest::Client,
    config: HttpSearchConfig,
    name: &'static str,
}

impl HttpSearchProvider {
    pub fn new(name: &'static str, config: HttpSearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            name,
        }
    }
}

#[derive(serde::Deserialize)]
struct HttpSearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, AppError> {
        let mut request = self
            .client
            .get(&self.config.base_url)
            .query(&[("q", query), ("count", &opts.size.to_string())])
            .timeout(std::time::Duration::from_millis(opts.timeout_ms));

        if let Some(region) = &opts.region {
            request = request.query(&[("region", region)]);
        }
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::select! {
            res = request.send() => res.map_err(AppError::from)?,
            () = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        let status = response.status().as_u16();
        if status == 429 || status >= 500 {
            return Err(AppError::UpstreamTransient(format!(
                "{} search returned {status}",
                self.name
            )));
        }
        if status == 400 || status == 401 || status == 404 {
            return Err(AppError::UpstreamNonRetryable(format!(
                "{} search returned {status}",
                self.name
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::UpstreamTransient(format!(
                "{} search returned {status}",
                self.name
            )));
        }

        let body: HttpSearchResponse = response.json().await.map_err(AppError::from)?;
        Ok(body.results)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
