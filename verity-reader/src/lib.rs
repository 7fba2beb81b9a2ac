//! Reads a URL into sanitizable text, preferring an external readability
//! service with a raw-fetch fallback.

pub mod guard;
pub mod html;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use verity_common::error::AppError;

use crate::guard::ensure_ingestion_url_allowed;
use crate::html::{extract_lang, extract_title, html_to_text, is_binary_content_type};

/// How long a rate-limit signal from the primary reader pauses it for.
const PRIMARY_COOLDOWN_MS: i64 = 45_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderPrefer {
    Primary,
    Raw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadFrom {
    Primary,
    Raw,
}

#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub timeout_ms: u64,
    pub max_bytes: usize,
    pub prefer: ReaderPrefer,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_bytes: 5_000_000,
            prefer: ReaderPrefer::Primary,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    pub text: String,
    pub html: Option<String>,
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub lang: Option<String>,
    pub content_type: Option<String>,
    pub http_status: Option<u16>,
    pub from: ReadFrom,
}

/// Configuration for an optional external readability service.
#[derive(Clone, Debug, Default)]
pub struct PrimaryReaderConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

pub struct Reader {
    client: Client,
    primary: PrimaryReaderConfig,
    cooldown_until_ms: Arc<AtomicI64>,
}

impl Reader {
    pub fn new(primary: PrimaryReaderConfig) -> Self {
        Self {
            client: Client::new(),
            primary,
            cooldown_until_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    fn in_cooldown(&self, now_ms: i64) -> bool {
        self.cooldown_until_ms.load(Ordering::Relaxed) > now_ms
    }

    fn start_cooldown(&self, now_ms: i64) {
        self.cooldown_until_ms
            .store(now_ms + PRIMARY_COOLDOWN_MS, Ordering::Relaxed);
    }

    /// Reads `url`, trying the primary readability service before falling
    /// back to a raw fetch. `cancel` aborts the in-flight request early, surfacing
    /// as `AppError::Cancelled`.
    #[instrument(skip(self, cancel), fields(url = %raw_url))]
    pub async fn read(
        &self,
        raw_url: &str,
        opts: ReadOptions,
        cancel: CancellationToken,
    ) -> Result<ReadResult, AppError> {
        let with_scheme = if raw_url.contains("://") {
            raw_url.to_string()
        } else {
            format!("https://{raw_url}")
        };
        let url = url::Url::parse(&with_scheme)
            .map_err(|e| AppError::Validation(format!("invalid URL: {e}")))?;
        ensure_ingestion_url_allowed(&url)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let use_primary = opts.prefer == ReaderPrefer::Primary
            && self.primary.base_url.is_some()
            && !self.in_cooldown(now_ms);

        if use_primary {
            match self.read_primary(url.as_str(), &opts, cancel.clone()).await {
                Ok(result) => return Ok(result),
                Err(AppError::UpstreamTransient(reason)) => {
                    warn!(%reason, "primary reader rate-limited, entering cooldown");
                    self.start_cooldown(now_ms);
                }
                Err(err) => {
                    debug!(%err, "primary reader failed, falling back to raw fetch");
                }
            }
        }

        self.read_raw(url.as_str(), &opts, cancel).await
    }

    async fn read_primary(
        &self,
        url: &str,
        opts: &ReadOptions,
        cancel: CancellationToken,
    ) -> Result<ReadResult, AppError> {
        let base_url = self
            .primary
            .base_url
            .as_ref()
            .ok_or_else(|| AppError::Internal("no primary reader configured".into()))?;

        let mut request = self
            .client
            .get(base_url)
            .query(&[("url", url)])
            .timeout(Duration::from_millis(opts.timeout_ms));
        if let Some(key) = &self.primary.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::select! {
            res = request.send() => res.map_err(AppError::from)?,
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        if response.status().as_u16() == 429 {
            return Err(AppError::UpstreamTransient("primary reader rate limited".into()));
        }
        if !response.status().is_success() {
            return Err(AppError::UpstreamNonRetryable(format!(
                "primary reader returned {}",
                response.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct PrimaryResponse {
            text: String,
            #[serde(default)]
            html: Option<String>,
            #[serde(default)]
            title: Option<String>,
            #[serde(default)]
            lang: Option<String>,
            #[serde(default)]
            final_url: Option<String>,
        }

        let status = response.status().as_u16();
        let body: PrimaryResponse = response.json().await.map_err(AppError::from)?;

        Ok(ReadResult {
            text: body.text,
            html: body.html,
            final_url: body.final_url,
            title: body.title,
            lang: body.lang,
            content_type: Some("text/plain".to_string()),
            http_status: Some(status),
            from: ReadFrom::Primary,
        })
    }

    async fn read_raw(
        &self,
        url: &str,
        opts: &ReadOptions,
        cancel: CancellationToken,
    ) -> Result<ReadResult, AppError> {
        let request = self
            .client
            .get(url)
            .timeout(Duration::from_millis(opts.timeout_ms));

        let response = tokio::select! {
            res = request.send() => res.map_err(AppError::from)?,
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        let http_status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = &content_type {
            if is_binary_content_type(ct) {
                return Err(AppError::BinaryContent(format!(
                    "rejected binary content type: {ct}"
                )));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(AppError::from)?;
            body.extend_from_slice(&chunk);
            if body.len() > opts.max_bytes {
                return Err(AppError::Validation(format!(
                    "response exceeded max_bytes cap of {}",
                    opts.max_bytes
                )));
            }
        }

        let raw_text = String::from_utf8_lossy(&body).into_owned();
        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("html"))
            .unwrap_or_else(|| raw_text.trim_start().starts_with('<'));

        let (text, html, title, lang) = if is_html {
            (
                html_to_text(&raw_text),
                Some(raw_text.clone()),
                extract_title(&raw_text),
                extract_lang(&raw_text),
            )
        } else {
            (raw_text, None, None, None)
        };

        Ok(ReadResult {
            text,
            html,
            final_url: Some(final_url),
            title,
            lang,
            content_type,
            http_status: Some(http_status),
            from: ReadFrom::Raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_disallowed_urls_before_any_network_call() {
        let reader = Reader::new(PrimaryReaderConfig::default());
        let result = reader
            .read("http://localhost/secret", ReadOptions::default(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn cooldown_state_starts_inactive() {
        let reader = Reader::new(PrimaryReaderConfig::default());
        assert!(!reader.in_cooldown(chrono::Utc::now().timestamp_millis()));
    }

    #[test]
    fn starting_cooldown_marks_it_active_for_the_window() {
        let reader = Reader::new(PrimaryReaderConfig::default());
        let now = 1_000_000i64;
        reader.start_cooldown(now);
        assert!(reader.in_cooldown(now + 1));
        assert!(!reader.in_cooldown(now + PRIMARY_COOLDOWN_MS + 1));
    }
}
