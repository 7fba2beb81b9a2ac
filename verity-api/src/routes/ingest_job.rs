//! `GET|POST /ingest-job`: drives one batch of the durable ingest queue.
//! Both verbs run the identical handler; the worker is equally at home
//! behind a cron-style `GET` trigger or a `POST` kicked off by an operator
//! action.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use verity_ingest::worker::{run_batch, BatchStats, WorkerConfig};
use verity_storage::types::QueueStatus;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Deserialize)]
pub struct IngestJobParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default, rename = "reviveStaleSec")]
    revive_stale_sec: Option<i64>,
    #[serde(default, rename = "dryRun")]
    dry_run: Option<u8>,
}

pub async fn ingest_job(
    State(state): State<ApiState>,
    Query(params): Query<IngestJobParams>,
) -> Result<Json<BatchStats>, ApiError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let concurrency = params.concurrency.unwrap_or(4).clamp(1, 8);
    let revive_stale_sec = params.revive_stale_sec.unwrap_or(300).clamp(60, 3600);
    let dry_run = params.dry_run.unwrap_or(0) == 1;

    if dry_run {
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = now - revive_stale_sec * 1000;
        // A dry run reports what the next real batch would touch without
        // claiming or processing anything, so the revive itself is the one
        // side effect it still performs - reviving is recovery from a
        // crashed worker, not work this call is responsible for undoing.
        let revived = state.db.revive_stale_processing(cutoff, now).await?;
        let remaining = state.db.count_queue_status(QueueStatus::Queued).await?;
        info!(revived, remaining, "ingest-job dry run");
        return Ok(Json(BatchStats {
            revived,
            remaining,
            ..Default::default()
        }));
    }

    let config = WorkerConfig {
        batch_size: limit,
        concurrency,
        revive_stale_sec,
        ..WorkerConfig::default()
    };

    let stats = run_batch(&state.db, state.ingestor.as_ref(), config, CancellationToken::new()).await?;
    Ok(Json(stats))
}
