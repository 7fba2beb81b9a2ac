//! Drains the durable `ingest_queue`: revives stale `processing` rows,
//! claims a batch, ingests each immediately, and records the outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use verity_common::error::AppError;
use verity_reader::Reader;
use verity_storage::types::QueueStatus;
use verity_storage::Db;

use crate::Ingestor;

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Max rows claimed per batch.
    pub batch_size: i64,
    /// How many claimed rows are processed concurrently.
    pub concurrency: usize,
    /// A `processing` row older than this is assumed abandoned by a crashed
    /// worker and reverted to `queued`.
    pub revive_stale_sec: i64,
    /// Attempts (inclusive of the first) before a row is marked terminally
    /// `error` instead of requeued.
    pub max_attempts: i64,
    pub idle_backoff: Duration,
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 4,
            revive_stale_sec: 300,
            max_attempts: 3,
            idle_backoff: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub revived: i64,
    pub claimed: i64,
    pub processed: i64,
    pub ok: i64,
    pub exists: i64,
    pub requeued: i64,
    pub errors: i64,
    pub remaining: i64,
}

/// Runs one claim-process-record cycle and returns its counts. Never
/// blocks waiting for more work; callers drive the idle/error backoff
/// loop in `run_worker_loop`.
pub async fn run_batch(
    db: &Db,
    ingestor: &Ingestor,
    config: WorkerConfig,
    cancel: CancellationToken,
) -> Result<BatchStats, AppError> {
    let now = chrono::Utc::now().timestamp_millis();
    let cutoff = now - config.revive_stale_sec * 1000;
    let revived = db.revive_stale_processing(cutoff, now).await?;

    let claimed = db.claim_next_batch(config.batch_size, now).await?;
    let mut stats = BatchStats {
        revived,
        claimed: claimed.len() as i64,
        ..Default::default()
    };

    if claimed.is_empty() {
        stats.remaining = db.count_queue_status(QueueStatus::Queued).await?;
        return Ok(stats);
    }

    let ingestor_urls: Vec<(String, String)> = claimed
        .iter()
        .map(|entry| (entry.id.clone(), entry.url.clone()))
        .collect();

    let results = verity_common::concurrency::map_limit(
        ingestor_urls,
        config.concurrency.max(1),
        |(id, url)| {
            let db = db.clone();
            let cancel = cancel.clone();
            let max_attempts = config.max_attempts;
            async move {
                let outcome = ingestor
                    .ingest(
                        &url,
                        crate::IngestOptions {
                            immediate: true,
                            priority: 0,
                        },
                        cancel,
                    )
                    .await;
                let now = chrono::Utc::now().timestamp_millis();
                match outcome {
                    Ok(outcome) => {
                        let _ = db.mark_done(id.clone(), now).await;
                        outcome.status
                    }
                    Err(err) => {
                        let status = db
                            .mark_error_or_retry(id.clone(), err.to_string(), max_attempts, now)
                            .await
                            .unwrap_or(QueueStatus::Error);
                        warn!(%id, %url, error = %err, "ingest worker task failed");
                        match status {
                            QueueStatus::Queued => crate::IngestStatus::Queued,
                            _ => crate::IngestStatus::Error,
                        }
                    }
                }
            }
        },
    )
    .await;

    for status in &results {
        stats.processed += 1;
        match status {
            crate::IngestStatus::Ok => stats.ok += 1,
            crate::IngestStatus::Exists => stats.exists += 1,
            crate::IngestStatus::Queued => stats.requeued += 1,
            crate::IngestStatus::Error => stats.errors += 1,
        }
    }

    stats.remaining = db.count_queue_status(QueueStatus::Queued).await?;
    Ok(stats)
}

/// Drives `run_batch` forever: idle-backs off when a batch claimed
/// nothing, error-backs off when the claim itself failed, otherwise loops
/// straight back into the next batch.
pub async fn run_worker_loop(db: Db, ingestor: Arc<Ingestor>, config: WorkerConfig, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            info!("ingest worker loop shutting down");
            return;
        }

        match run_batch(&db, &ingestor, config, cancel.clone()).await {
            Ok(stats) if stats.claimed == 0 => {
                sleep(config.idle_backoff).await;
            }
            Ok(stats) => {
                info!(
                    claimed = stats.claimed,
                    ok = stats.ok,
                    exists = stats.exists,
                    requeued = stats.requeued,
                    errors = stats.errors,
                    remaining = stats.remaining,
                    "ingest worker batch complete"
                );
            }
            Err(err) => {
                error!(error = %err, "ingest worker batch failed");
                sleep(config.error_backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_reader::PrimaryReaderConfig;

    fn harness() -> (Db, Ingestor) {
        let db = futures::executor::block_on(Db::in_memory()).unwrap();
        let reader = Arc::new(Reader::new(PrimaryReaderConfig::default()));
        (db.clone(), Ingestor::new(db, reader))
    }

    #[tokio::test]
    async fn empty_queue_returns_zeroed_stats() {
        let (db, ingestor) = harness();
        let stats = run_batch(&db, &ingestor, WorkerConfig::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.claimed, 0);
        assert_eq!(stats.remaining, 0);
    }

    #[tokio::test]
    async fn invalid_queued_url_eventually_errors_out() {
        let (db, ingestor) = harness();
        db.enqueue_url("not a url at all".into(), 0, 1).await.unwrap();

        let config = WorkerConfig {
            max_attempts: 1,
            ..WorkerConfig::default()
        };
        let stats = run_batch(&db, &ingestor, config, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.remaining, 0);
    }

    #[tokio::test]
    async fn stale_processing_rows_are_revived_before_claiming() {
        let (db, ingestor) = harness();
        let entry = db.enqueue_url("https://example.com/a".into(), 0, 1).await.unwrap();
        db.claim_next_batch(10, 2).await.unwrap();

        let config = WorkerConfig {
            revive_stale_sec: 0,
            ..WorkerConfig::default()
        };
        // `revive_stale_processing` only reclaims rows strictly older than
        // the cutoff, so advance the clock far enough past the claim.
        let _ = entry;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let stats = run_batch(&db, &ingestor, config, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.revived, 1);
    }
}
