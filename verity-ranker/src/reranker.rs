//! Optional cross-encoder rerank: a small pool of `fastembed` rerank
//! engines behind a semaphore, checked out per call and falling back to
//! BM25 order on any error.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::available_parallelism;

use async_trait::async_trait;
use fastembed::{RerankInitOptions, TextRerank};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use verity_common::error::AppError;

/// A pluggable cross-encoder reranker. Kept as a trait so tests and
/// callers that have no model download available can swap in a fake.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns a relevance score in `[0,1]` per document, same order as
    /// `documents`.
    async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<f32>, AppError>;
}

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    NEXT_ENGINE.fetch_add(1, Ordering::Relaxed) % pool_len
}

/// A small pool of local rerank engines, checked out round-robin behind a
/// semaphore so concurrent ranking calls don't all pile onto one model
/// instance.
pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl RerankerPool {
    /// Builds the pool at startup. `pool_size` bounds max-parallel reranks.
    pub fn new(pool_size: usize, cache_dir: impl AsRef<Path>) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation("rerank pool size must be greater than zero".into()));
        }

        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;

        let mut init_options = RerankInitOptions::default();
        init_options.cache_dir = cache_dir;
        init_options.show_download_progress = env_bool("RERANK_SHOW_DOWNLOAD_PROGRESS").unwrap_or(true);

        let mut engines = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            debug!(engine = i, "initializing rerank engine");
            let model = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::Internal(format!("rerank model init failed: {e}")))?;
            engines.push(Arc::new(Mutex::new(model)));
        }

        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }))
    }

    /// Default pool sized to the machine, capped at 2 so we don't load the
    /// rerank model on every core.
    pub fn default_pool_size() -> usize {
        available_parallelism().map(|n| n.get().min(2)).unwrap_or(2).max(1)
    }

    /// Checks out capacity and picks an engine via a round-robin counter;
    /// dropping the lease releases the semaphore permit.
    pub async fn checkout(&self) -> RerankerLease {
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore closed");
        let idx = pick_engine_index(self.engines.len());
        RerankerLease {
            _permit: permit,
            engine: self.engines[idx].clone(),
        }
    }
}

pub struct RerankerLease {
    _permit: OwnedSemaphorePermit,
    engine: Arc<Mutex<TextRerank>>,
}

#[async_trait]
impl Reranker for RerankerPool {
    async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<f32>, AppError> {
        let lease = self.checkout().await;
        lease.rerank(query, documents).await
    }
}

impl RerankerLease {
    pub async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<f32>, AppError> {
        let mut guard = self.engine.lock().await;
        let results = guard
            .rerank(query.to_owned(), documents.clone(), false, None)
            .map_err(|e| AppError::Internal(format!("rerank failed: {e}")))?;

        // fastembed returns results possibly re-ordered by score; map back
        // to the input order via each result's `document`/`index`.
        let mut scores = vec![0.0f32; documents.len()];
        for r in results {
            if let Some(idx) = r.index.checked_sub(0) {
                if let Some(slot) = scores.get_mut(idx) {
                    *slot = r.score;
                }
            }
        }
        Ok(scores)
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

pub fn default_cache_dir(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("fastembed").join("reranker")
}
