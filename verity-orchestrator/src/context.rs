use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use verity_ingest::Ingestor;
use verity_llm::LlmGateway;
use verity_ranker::{RankedHit, Reranker};
use verity_search::SearchAdapter;
use verity_storage::Db;

use crate::config::{Depth, OrchestratorConfig};
use crate::events::RunEvent;

/// The research question plus the per-request constraints from `POST
/// /research`'s body.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub question: String,
    pub depth: Depth,
    pub time_from: Option<String>,
    pub time_to: Option<String>,
    pub region: Option<String>,
    pub allowed_domains: Vec<String>,
    pub disallowed_domains: Vec<String>,
    pub visitor_id: Option<String>,
}

/// Wires the collaborating services a run drives; constructed once per
/// process and shared (via `Arc`) across concurrent runs.
#[derive(Clone)]
pub struct Collaborators {
    pub db: Db,
    pub search: Arc<SearchAdapter>,
    pub ingestor: Arc<Ingestor>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub llm: Arc<LlmGateway>,
}

/// Mutable state threaded through every stage of one run.
pub struct RunContext {
    pub request: RunRequest,
    pub config: OrchestratorConfig,
    pub collaborators: Collaborators,
    pub events: Sender<RunEvent>,
    pub cancel: CancellationToken,

    pub thread_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,

    pub subqueries: Vec<String>,
    pub unique_urls: Vec<String>,
    pub ingested_source_ids: Vec<String>,
    pub ranked_hits: Vec<RankedHit>,

    pub answer_text: String,
    /// `(source_id, chunk_id, text)` for every chunk actually cited in the
    /// answer prompt, carried into the verify stage unchanged.
    pub cited_chunks: Vec<(String, String, String)>,
    /// Set when the answer stage hit `LlmBudgetExceeded`, even if the retry
    /// with a halved budget went on to succeed. Gates the verify-stage skip
    /// when `skip_verify_on_tpm` is set.
    pub answer_hit_budget_error: bool,
}

impl RunContext {
    pub async fn emit(&self, event: RunEvent) {
        // The writer (`verity-stream`) is backpressure-aware and buffers at
        // most one event; a closed receiver means the client disconnected,
        // which the caller observes by the run's cancellation token firing.
        let _ = self.events.send(event).await;
    }
}
