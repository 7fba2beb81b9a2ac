use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use verity_api::{api_routes_v1, ApiState};
use verity_common::config::{get_config, AppConfig};
use verity_ingest::worker::{run_worker_loop, WorkerConfig};
use verity_ingest::Ingestor;
use verity_llm::gateway::{LlmGateway, ModelConfig};
use verity_ranker::{Reranker, RerankerPool};
use verity_reader::{PrimaryReaderConfig, Reader};
use verity_search::{HttpSearchConfig, HttpSearchProvider, SearchAdapter, SearchProvider};
use verity_storage::Db;

fn build_search(config: &AppConfig) -> Arc<SearchAdapter> {
    let primary = Arc::new(HttpSearchProvider::new(
        "primary",
        HttpSearchConfig {
            base_url: config.search_base_url.clone(),
            api_key: config.search_api_key.clone(),
        },
    ));
    let fallback = config.search_fallback_base_url.clone().map(|base_url| {
        Arc::new(HttpSearchProvider::new(
            "fallback",
            HttpSearchConfig {
                base_url,
                api_key: config.search_fallback_api_key.clone(),
            },
        )) as Arc<dyn SearchProvider>
    });
    Arc::new(SearchAdapter::new(primary, fallback))
}

fn build_reader(config: &AppConfig) -> Arc<Reader> {
    Arc::new(Reader::new(PrimaryReaderConfig {
        base_url: config.reader_base_url.clone(),
        api_key: config.reader_api_key.clone(),
    }))
}

fn build_reranker(config: &AppConfig) -> Result<Option<Arc<dyn Reranker>>, Box<dyn std::error::Error>> {
    if !config.enable_rerank {
        return Ok(None);
    }
    let cache_dir = std::path::Path::new(&config.data_dir).join("rerank-cache");
    Ok(Some(RerankerPool::new(config.rerank_pool_size, cache_dir)?))
}

fn build_llm(config: &AppConfig) -> Arc<LlmGateway> {
    Arc::new(LlmGateway::new(
        &config.llm_api_key,
        &config.llm_base_url,
        ModelConfig {
            plan_model: config.plan_model.clone(),
            answer_model: config.answer_model.clone(),
            verify_model: config.verify_model.clone(),
            reasoning_model: config.reasoning_model.clone(),
        },
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Db::open(&config.db_path).await?;
    let search = build_search(&config);
    let reader = build_reader(&config);
    let ingestor = Arc::new(Ingestor::new(db.clone(), reader));
    let reranker = build_reranker(&config)?;
    let llm = build_llm(&config);

    let api_state = ApiState::new(db.clone(), config.clone(), search, ingestor.clone(), reranker, llm);

    let app: Router<()> = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&serve_address).await?;
    info!(address = %serve_address, "starting server");

    let server_handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to start server runtime");
        rt.block_on(async {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "server error");
            }
        });
    });

    info!("starting ingest worker loop");
    run_worker_loop(db, ingestor, WorkerConfig::default(), CancellationToken::new()).await;

    if let Err(e) = server_handle.join() {
        error!(error = ?e, "server thread panicked");
    }

    Ok(())
}
