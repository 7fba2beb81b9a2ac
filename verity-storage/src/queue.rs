use rusqlite::params;
use verity_common::error::AppError;
use verity_common::ids::new_ulid_string;

use crate::db::Db;
use crate::types::{IngestQueueEntry, QueueStatus};

impl Db {
    pub async fn enqueue_url(
        &self,
        url: String,
        priority: i64,
        now: i64,
    ) -> Result<IngestQueueEntry, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO ingest_queue (id, url, priority, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'queued', 0, ?4, ?4)",
                params![id, url, priority, now],
            )?;
            Ok(IngestQueueEntry {
                id,
                url,
                priority,
                status: QueueStatus::Queued,
                attempts: 0,
                error: None,
                created_at: now,
                updated_at: now,
            })
        })
        .await
    }

    /// Claims up to `limit` `queued` rows in a single transaction, marking
    /// them `processing`. Highest priority, then oldest, first.
    pub async fn claim_next_batch(
        &self,
        limit: i64,
        now: i64,
    ) -> Result<Vec<IngestQueueEntry>, AppError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM ingest_queue
                     WHERE status = 'queued'
                     ORDER BY priority DESC, created_at ASC
                     LIMIT ?1",
                )?;
                stmt.query_map(params![limit], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            };

            let mut claimed = Vec::with_capacity(ids.len());
            for id in ids {
                tx.execute(
                    "UPDATE ingest_queue SET status = 'processing', updated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                let entry = tx.query_row(
                    "SELECT id, url, priority, status, attempts, error, created_at, updated_at
                     FROM ingest_queue WHERE id = ?1",
                    params![id],
                    row_to_entry,
                )?;
                claimed.push(entry);
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
    }

    pub async fn mark_done(&self, id: String, now: i64) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE ingest_queue SET status = 'done', updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
    }

    /// Records a failed attempt. Re-queues (`status = queued`) if
    /// `attempts` after incrementing is still below `max_attempts`,
    /// otherwise marks `error` terminally.
    pub async fn mark_error_or_retry(
        &self,
        id: String,
        error: String,
        max_attempts: i64,
        now: i64,
    ) -> Result<QueueStatus, AppError> {
        self.with_conn(move |conn| {
            let attempts: i64 = conn.query_row(
                "SELECT attempts FROM ingest_queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            let new_attempts = attempts + 1;
            let status = if new_attempts < max_attempts {
                QueueStatus::Queued
            } else {
                QueueStatus::Error
            };
            conn.execute(
                "UPDATE ingest_queue SET status = ?1, attempts = ?2, error = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![status.as_str(), new_attempts, error, now, id],
            )?;
            Ok(status)
        })
        .await
    }

    /// Reverts `processing` rows whose `updated_at` is older than
    /// `cutoff` back to `queued`, recovering from a worker crash mid-task.
    pub async fn revive_stale_processing(&self, cutoff: i64, now: i64) -> Result<i64, AppError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE ingest_queue SET status = 'queued', updated_at = ?1
                 WHERE status = 'processing' AND updated_at < ?2",
                params![now, cutoff],
            )?;
            Ok(changed as i64)
        })
        .await
    }

    pub async fn count_queue_status(&self, status: QueueStatus) -> Result<i64, AppError> {
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM ingest_queue WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?)
        })
        .await
    }

    pub async fn get_queue_entry(&self, id: String) -> Result<Option<IngestQueueEntry>, AppError> {
        self.with_conn(move |conn| {
            use rusqlite::OptionalExtension;
            conn.query_row(
                "SELECT id, url, priority, status, attempts, error, created_at, updated_at
                 FROM ingest_queue WHERE id = ?1",
                params![id],
                row_to_entry,
            )
            .optional()
            .map_err(AppError::from)
        })
        .await
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<IngestQueueEntry> {
    let status: String = row.get(3)?;
    Ok(IngestQueueEntry {
        id: row.get(0)?,
        url: row.get(1)?,
        priority: row.get(2)?,
        status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Error),
        attempts: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_marks_rows_processing_in_priority_order() {
        let db = Db::in_memory().await.unwrap();
        db.enqueue_url("https://a.example".into(), 0, 1).await.unwrap();
        db.enqueue_url("https://b.example".into(), 5, 2).await.unwrap();

        let claimed = db.claim_next_batch(10, 100).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].url, "https://b.example");
        assert!(claimed.iter().all(|e| e.status == QueueStatus::Processing));
    }

    #[tokio::test]
    async fn retry_requeues_until_max_attempts() {
        let db = Db::in_memory().await.unwrap();
        let entry = db.enqueue_url("https://a.example".into(), 0, 1).await.unwrap();
        db.claim_next_batch(10, 2).await.unwrap();

        let status = db
            .mark_error_or_retry(entry.id.clone(), "boom".into(), 3, 3)
            .await
            .unwrap();
        assert_eq!(status, QueueStatus::Queued);

        db.claim_next_batch(10, 4).await.unwrap();
        let status = db
            .mark_error_or_retry(entry.id.clone(), "boom again".into(), 3, 5)
            .await
            .unwrap();
        assert_eq!(status, QueueStatus::Queued);

        db.claim_next_batch(10, 6).await.unwrap();
        let status = db
            .mark_error_or_retry(entry.id.clone(), "final boom".into(), 3, 7)
            .await
            .unwrap();
        assert_eq!(status, QueueStatus::Error);
    }

    #[tokio::test]
    async fn stale_processing_rows_are_revived() {
        let db = Db::in_memory().await.unwrap();
        let entry = db.enqueue_url("https://a.example".into(), 0, 1).await.unwrap();
        db.claim_next_batch(10, 2).await.unwrap();

        let revived = db.revive_stale_processing(1000, 2000).await.unwrap();
        assert_eq!(revived, 1);

        let reloaded = db.get_queue_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, QueueStatus::Queued);
    }
}
