//! Dedups, canonicalizes, fetches, chunks, and persists candidate URLs,
//! either inline (immediate) or via the durable `ingest_queue`.

pub mod worker;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use verity_common::error::AppError;
use verity_common::text::{estimate_tokens, sanitize, split_into_windows, SanitizeOptions, WindowOptions};
use verity_common::urlnorm::{canonicalize, host_of};
use verity_reader::{ReadOptions, Reader};
use verity_storage::types::SourceStatus;
use verity_storage::Db;

/// Default size of the bounded pool a caller should use to fan out
/// concurrent `ingest` calls.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ok,
    Exists,
    Queued,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub url: String,
    pub status: IngestStatus,
    pub source_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub immediate: bool,
    pub priority: i64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            priority: 0,
        }
    }
}

pub struct Ingestor {
    db: Db,
    reader: Arc<Reader>,
}

impl Ingestor {
    pub fn new(db: Db, reader: Arc<Reader>) -> Self {
        Self { db, reader }
    }

    /// Ingests a single URL per the immediate/queued algorithm. Idempotent
    /// against `sources.url`: a URL already present returns `Exists`
    /// without touching storage again.
    #[instrument(skip(self, cancel), fields(url = %raw_url))]
    pub async fn ingest(
        &self,
        raw_url: &str,
        opts: IngestOptions,
        cancel: CancellationToken,
    ) -> Result<IngestOutcome, AppError> {
        let canon = canonicalize(raw_url)
            .map_err(|e| AppError::Validation(format!("invalid URL {raw_url}: {e}")))?;

        if let Some(existing) = self.db.get_source_by_url(canon.clone()).await? {
            return Ok(IngestOutcome {
                url: canon,
                status: IngestStatus::Exists,
                source_id: Some(existing.id),
                message: None,
            });
        }

        if !opts.immediate {
            let now = chrono::Utc::now().timestamp_millis();
            self.db.enqueue_url(canon.clone(), opts.priority, now).await?;
            return Ok(IngestOutcome {
                url: canon,
                status: IngestStatus::Queued,
                source_id: None,
                message: None,
            });
        }

        self.ingest_immediate(canon, cancel).await
    }

    async fn ingest_immediate(
        &self,
        canon_url: String,
        cancel: CancellationToken,
    ) -> Result<IngestOutcome, AppError> {
        let domain = host_of(&canon_url).unwrap_or_default();

        let read = self
            .reader
            .read(&canon_url, ReadOptions::default(), cancel)
            .await?;

        let text = sanitize(&read.text, SanitizeOptions::default());
        let now = chrono::Utc::now().timestamp_millis();

        let source = self
            .db
            .insert_source(canon_url.clone(), domain, SourceStatus::Ready, now)
            .await?;

        // Conflict-do-nothing races: another caller may have inserted this
        // URL between our read and our insert; treat it as `exists`.
        if source.created_at != now {
            return Ok(IngestOutcome {
                url: canon_url,
                status: IngestStatus::Exists,
                source_id: Some(source.id),
                message: None,
            });
        }

        self.db
            .upsert_source_content(source.id.clone(), text.clone(), read.html)
            .await?;

        let windows = split_into_windows(&text, WindowOptions::default());
        let rows = windows
            .into_iter()
            .enumerate()
            .map(|(pos, w)| {
                (
                    pos as i64,
                    w.char_start as i64,
                    w.char_end as i64,
                    w.text.clone(),
                    estimate_tokens(&w.text) as i64,
                )
            })
            .collect::<Vec<_>>();

        self.db.insert_chunks(source.id.clone(), rows, now).await?;
        self.db
            .update_source_status(source.id.clone(), SourceStatus::Ready, read.http_status.map(i64::from))
            .await?;

        info!(source_id = %source.id, "ingested source");

        Ok(IngestOutcome {
            url: canon_url,
            status: IngestStatus::Ok,
            source_id: Some(source.id),
            message: None,
        })
    }

    /// Fans `urls` out over a bounded pool, collecting one outcome per URL
    /// in input order. Read/storage failures for one URL never abort the
    /// others.
    pub async fn ingest_many(
        &self,
        urls: Vec<String>,
        opts: IngestOptions,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Vec<IngestOutcome> {
        let db = self.db.clone();
        let reader = self.reader.clone();
        verity_common::concurrency::map_limit(urls, concurrency.max(1), move |url| {
            let ingestor = Ingestor {
                db: db.clone(),
                reader: reader.clone(),
            };
            let opts = opts.clone();
            let cancel = cancel.clone();
            async move {
                match ingestor.ingest(&url, opts, cancel).await {
                    Ok(outcome) => outcome,
                    Err(err) => IngestOutcome {
                        url,
                        status: IngestStatus::Error,
                        source_id: None,
                        message: Some(err.to_string()),
                    },
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_reader::PrimaryReaderConfig;

    fn ingestor() -> (Ingestor, Db) {
        // Tests exercise only the exists/dedup branch, which never reaches
        // the network, so a real `Reader` with no primary configured is
        // safe to construct synchronously here.
        let reader = Arc::new(Reader::new(PrimaryReaderConfig::default()));
        let db = futures::executor::block_on(Db::in_memory()).unwrap();
        (Ingestor::new(db.clone(), reader), db)
    }

    #[tokio::test]
    async fn reingesting_the_same_url_reports_exists() {
        let (ingestor, db) = ingestor();
        let now = 1;
        db.insert_source(
            "https://example.com/a?a=1&b=2".into(),
            "example.com".into(),
            SourceStatus::Ready,
            now,
        )
        .await
        .unwrap();

        let outcome = ingestor
            .ingest(
                "HTTPS://Example.COM/a/?utm_source=x&b=2&a=1#frag",
                IngestOptions::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, IngestStatus::Exists);
        assert_eq!(outcome.url, "https://example.com/a?a=1&b=2");
    }

    #[tokio::test]
    async fn non_immediate_ingest_enqueues_instead_of_reading() {
        let (ingestor, db) = ingestor();
        let outcome = ingestor
            .ingest(
                "https://example.com/new",
                IngestOptions {
                    immediate: false,
                    priority: 3,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, IngestStatus::Queued);
        let count = db
            .count_queue_status(verity_storage::types::QueueStatus::Queued)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rejects_invalid_urls() {
        let (ingestor, _db) = ingestor();
        let result = ingestor
            .ingest("not a url at all", IngestOptions::default(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
