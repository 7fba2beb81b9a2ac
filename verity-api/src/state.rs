//! Process-wide application state, built once at startup and shared (via
//! `axum::extract::State`, cheap to `Clone`) across every request: one
//! handle per research-pipeline collaborator.

use std::sync::Arc;

use verity_common::config::AppConfig;
use verity_ingest::Ingestor;
use verity_llm::gateway::LlmGateway;
use verity_orchestrator::context::Collaborators;
use verity_ranker::Reranker;
use verity_search::SearchAdapter;
use verity_storage::Db;

#[derive(Clone)]
pub struct ApiState {
    pub db: Db,
    pub config: AppConfig,
    pub search: Arc<SearchAdapter>,
    pub ingestor: Arc<Ingestor>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub llm: Arc<LlmGateway>,
}

impl ApiState {
    pub fn new(
        db: Db,
        config: AppConfig,
        search: Arc<SearchAdapter>,
        ingestor: Arc<Ingestor>,
        reranker: Option<Arc<dyn Reranker>>,
        llm: Arc<LlmGateway>,
    ) -> Self {
        Self {
            db,
            config,
            search,
            ingestor,
            reranker,
            llm,
        }
    }

    /// Bundles the collaborators an orchestrator run needs, per request -
    /// cheap, since every field is an `Arc`/handle clone.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            db: self.db.clone(),
            search: self.search.clone(),
            ingestor: self.ingestor.clone(),
            reranker: self.reranker.clone(),
            llm: self.llm.clone(),
        }
    }
}
