use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use verity_common::config::get_config;
use verity_ingest::worker::{run_worker_loop, WorkerConfig};
use verity_ingest::Ingestor;
use verity_reader::{PrimaryReaderConfig, Reader};
use verity_storage::Db;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Db::open(&config.db_path).await?;

    let reader = Arc::new(Reader::new(PrimaryReaderConfig {
        base_url: config.reader_base_url.clone(),
        api_key: config.reader_api_key.clone(),
    }));
    let ingestor = Arc::new(Ingestor::new(db.clone(), reader));

    info!("starting ingest worker loop");
    run_worker_loop(db, ingestor, WorkerConfig::default(), CancellationToken::new()).await;

    Ok(())
}
