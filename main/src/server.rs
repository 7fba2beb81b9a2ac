use std::sync::Arc;

use axum::Router;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use verity_api::{api_routes_v1, ApiState};
use verity_common::config::get_config;
use verity_llm::gateway::{LlmGateway, ModelConfig};
use verity_ranker::{Reranker, RerankerPool};
use verity_reader::{PrimaryReaderConfig, Reader};
use verity_search::{HttpSearchConfig, HttpSearchProvider, SearchAdapter, SearchProvider};
use verity_storage::Db;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Db::open(&config.db_path).await?;

    let primary_search = Arc::new(HttpSearchProvider::new(
        "primary",
        HttpSearchConfig {
            base_url: config.search_base_url.clone(),
            api_key: config.search_api_key.clone(),
        },
    ));
    let fallback_search = config.search_fallback_base_url.clone().map(|base_url| {
        Arc::new(HttpSearchProvider::new(
            "fallback",
            HttpSearchConfig {
                base_url,
                api_key: config.search_fallback_api_key.clone(),
            },
        )) as Arc<dyn SearchProvider>
    });
    let search = Arc::new(SearchAdapter::new(primary_search, fallback_search));

    let reader = Arc::new(Reader::new(PrimaryReaderConfig {
        base_url: config.reader_base_url.clone(),
        api_key: config.reader_api_key.clone(),
    }));
    let ingestor = Arc::new(verity_ingest::Ingestor::new(db.clone(), reader));

    let reranker: Option<Arc<dyn Reranker>> = if config.enable_rerank {
        let cache_dir = std::path::Path::new(&config.data_dir).join("rerank-cache");
        Some(RerankerPool::new(config.rerank_pool_size, cache_dir)?)
    } else {
        None
    };

    let llm = Arc::new(LlmGateway::new(
        &config.llm_api_key,
        &config.llm_base_url,
        ModelConfig {
            plan_model: config.plan_model.clone(),
            answer_model: config.answer_model.clone(),
            verify_model: config.verify_model.clone(),
            reasoning_model: config.reasoning_model.clone(),
        },
    ));

    let api_state = ApiState::new(db, config.clone(), search, ingestor, reranker, llm);

    let app: Router<()> = Router::new().nest("/api/v1", api_routes_v1(&api_state)).with_state(api_state);

    info!("starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
