use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use verity_common::error::AppError;
use verity_common::retry::{retry_with_backoff, RetryPolicy};
use verity_common::urlnorm::{canonicalize, host_matches_suffix, host_of};

use crate::provider::SearchProvider;
use crate::types::{SearchOptions, SearchResult};

/// Drives one or more `SearchProvider`s through the loosen/fallback/retry
/// algorithm, post-filtering and deduping the merged result list.
pub struct SearchAdapter {
    primary: Arc<dyn SearchProvider>,
    fallback: Option<Arc<dyn SearchProvider>>,
}

impl SearchAdapter {
    pub fn new(primary: Arc<dyn SearchProvider>, fallback: Option<Arc<dyn SearchProvider>>) -> Self {
        Self { primary, fallback }
    }

    #[instrument(skip(self, cancel), fields(query = %query))]
    pub async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, AppError> {
        let mut results = self
            .run_provider(self.primary.as_ref(), query, opts, cancel.clone())
            .await
            .unwrap_or_default();

        if results.is_empty() {
            let loosened_query = loosen_query(query);
            let mut loosened_opts = opts.clone();
            loosened_opts.size = (opts.size * 2).max(opts.size + 5);
            loosened_opts.allowed_domains.clear();
            loosened_opts.disallowed_domains.clear();
            debug!(loosened_query, "primary search empty, retrying loosened");
            results = self
                .run_provider(self.primary.as_ref(), &loosened_query, &loosened_opts, cancel.clone())
                .await
                .unwrap_or_default();
        }

        if results.is_empty() {
            if let Some(fallback) = &self.fallback {
                debug!(provider = fallback.name(), "primary still empty, trying fallback provider");
                results = self
                    .run_provider(fallback.as_ref(), query, opts, cancel.clone())
                    .await
                    .unwrap_or_default();
            }
        }

        let filtered = post_filter(results, opts);
        let deduped = canonicalize_and_dedupe(filtered);

        info!(count = deduped.len(), "search complete");
        Ok(deduped)
    }

    async fn run_provider(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        opts: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, AppError> {
        let policy = RetryPolicy::search_default();
        retry_with_backoff(
            policy,
            || cancel.is_cancelled(),
            || provider.search(query, opts, cancel.clone()),
            AppError::is_transient,
        )
        .await
    }
}

/// Strips quotes/parens and collapses whitespace, per the "loosen the
/// query" retry step.
fn loosen_query(query: &str) -> String {
    let stripped: String = query
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '(' | ')'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn post_filter(results: Vec<SearchResult>, opts: &SearchOptions) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| {
            let Some(host) = host_of(&r.url) else {
                return false;
            };
            if !opts.allowed_domains.is_empty()
                && !opts.allowed_domains.iter().any(|d| host_matches_suffix(&host, d))
            {
                return false;
            }
            if opts.disallowed_domains.iter().any(|d| host_matches_suffix(&host, d)) {
                return false;
            }
            true
        })
        .collect()
}

/// Canonicalizes every result's URL and drops later duplicates, keeping the
/// first-seen entry's metadata.
fn canonicalize_and_dedupe(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(results.len());
    for mut result in results {
        let Ok(canon) = canonicalize(&result.url) else {
            continue;
        };
        if seen.insert(canon.clone()) {
            result.url = canon;
            out.push(result);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        name: &'static str,
        responses: std::sync::Mutex<Vec<Result<Vec<SearchResult>, AppError>>>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str, responses: Vec<Result<Vec<SearchResult>, AppError>>) -> Self {
            Self {
                name,
                responses: std::sync::Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        async fn search(
            &self,
            _query: &str,
            _opts: &SearchOptions,
            _cancel: CancellationToken,
        ) -> Result<Vec<SearchResult>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn result(url: &str) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: None,
            snippet: None,
            score: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn uses_primary_results_when_non_empty() {
        let primary = Arc::new(FakeProvider::new(
            "primary",
            vec![Ok(vec![result("https://example.com/a")])],
        ));
        let adapter = SearchAdapter::new(primary, None);
        let results = adapter
            .search("test query", &SearchOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_provider_when_primary_stays_empty() {
        let primary = Arc::new(FakeProvider::new("primary", vec![Ok(vec![]), Ok(vec![])]));
        let fallback = Arc::new(FakeProvider::new(
            "fallback",
            vec![Ok(vec![result("https://fallback.example/x")])],
        ));
        let adapter = SearchAdapter::new(primary, Some(fallback));
        let results = adapter
            .search("\"no results\" query", &SearchOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://fallback.example/x");
    }

    #[tokio::test]
    async fn deduplicates_canonicalized_urls_preserving_first_seen() {
        let primary = Arc::new(FakeProvider::new(
            "primary",
            vec![Ok(vec![
                result("https://Example.com/a?utm_source=x&b=2"),
                result("https://example.com/a?b=2"),
            ])],
        ));
        let adapter = SearchAdapter::new(primary, None);
        let results = adapter
            .search("q", &SearchOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a?b=2");
    }

    #[tokio::test]
    async fn post_filter_drops_disallowed_domains() {
        let primary = Arc::new(FakeProvider::new(
            "primary",
            vec![Ok(vec![
                result("https://good.example/a"),
                result("https://bad.example/b"),
            ])],
        ));
        let adapter = SearchAdapter::new(primary, None);
        let mut opts = SearchOptions::default();
        opts.disallowed_domains = vec!["bad.example".to_string()];
        let results = adapter
            .search("q", &opts, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://good.example/a");
    }

    #[test]
    fn loosen_query_strips_quotes_and_collapses_whitespace() {
        assert_eq!(loosen_query("\"hello   world\" (test)"), "hello world test");
    }
}
