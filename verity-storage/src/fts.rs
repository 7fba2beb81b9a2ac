use rusqlite::params;
use verity_common::error::AppError;

use crate::db::Db;
use crate::types::Chunk;

/// A chunk matched by full-text search along with its BM25 score. Lower
/// `bm25` is a better match (SQLite's `bm25()` convention); callers apply
/// their own score-fusion transform.
#[derive(Clone, Debug, PartialEq)]
pub struct FtsHit {
    pub chunk: Chunk,
    pub bm25: f64,
}

impl Db {
    /// Runs a BM25-ranked FTS query over `chunks_fts`, optionally scoped to
    /// `source_id`, returning up to `limit` hits ordered by best match
    /// first.
    pub async fn search_chunks_fts(
        &self,
        query: String,
        source_id: Option<String>,
        limit: i64,
    ) -> Result<Vec<FtsHit>, AppError> {
        self.with_conn(move |conn| {
            let sql = if source_id.is_some() {
                "SELECT c.id, c.source_id, c.pos, c.char_start, c.char_end, c.text, c.tokens,
                        c.created_at, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 JOIN chunks c ON c.seq = chunks_fts.rowid
                 WHERE chunks_fts MATCH ?1 AND c.source_id = ?2
                 ORDER BY score ASC
                 LIMIT ?3"
            } else {
                "SELECT c.id, c.source_id, c.pos, c.char_start, c.char_end, c.text, c.tokens,
                        c.created_at, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 JOIN chunks c ON c.seq = chunks_fts.rowid
                 WHERE chunks_fts MATCH ?1
                 ORDER BY score ASC
                 LIMIT ?2"
            };

            let mut stmt = conn.prepare(sql)?;
            let map_row = |row: &rusqlite::Row| -> rusqlite::Result<FtsHit> {
                Ok(FtsHit {
                    chunk: Chunk {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        pos: row.get(2)?,
                        char_start: row.get(3)?,
                        char_end: row.get(4)?,
                        text: row.get(5)?,
                        tokens: row.get(6)?,
                        created_at: row.get(7)?,
                    },
                    bm25: row.get(8)?,
                })
            };

            let hits = if let Some(source_id) = source_id {
                stmt.query_map(params![query, source_id, limit], map_row)?
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                stmt.query_map(params![query, limit], map_row)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            Ok(hits)
        })
        .await
    }

    /// Last-resort retrieval when FTS yields nothing even after a rebuild:
    /// plain `LIKE` over `chunks.text`, scoped to the most recently crawled
    /// sources, ordered by chunk token count descending. `terms` should
    /// already be stopword-filtered and length-checked by the caller.
    pub async fn search_chunks_like(&self, terms: Vec<String>, limit: i64) -> Result<Vec<Chunk>, AppError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(move |conn| {
            let clauses = terms.iter().map(|_| "c.text LIKE ?").collect::<Vec<_>>().join(" OR ");
            let sql = format!(
                "SELECT c.id, c.source_id, c.pos, c.char_start, c.char_end, c.text, c.tokens, c.created_at
                 FROM chunks c
                 JOIN sources s ON s.id = c.source_id
                 WHERE c.source_id IN (SELECT id FROM sources ORDER BY created_at DESC LIMIT 200)
                   AND ({clauses})
                 ORDER BY c.tokens DESC
                 LIMIT ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = terms
                .iter()
                .map(|t| Box::new(format!("%{t}%")) as Box<dyn rusqlite::ToSql>)
                .collect();
            params.push(Box::new(limit));
            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| {
                    Ok(Chunk {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        pos: row.get(2)?,
                        char_start: row.get(3)?,
                        char_end: row.get(4)?,
                        text: row.get(5)?,
                        tokens: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Rebuilds `chunks_fts` from `chunks` from scratch. Used by operators
    /// to repair drift, and by the ingest worker after bulk backfills.
    pub async fn rebuild_fts(&self) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild')", [])?;
            Ok(())
        })
        .await
    }

    /// Checks that `chunks_fts` and `chunks` agree row-for-row. Returns
    /// `true` if consistent.
    pub async fn verify_fts_consistent(&self) -> Result<bool, AppError> {
        self.with_conn(|conn| {
            let chunk_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            let fts_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunks_fts", [], |row| row.get(0))?;
            Ok(chunk_count == fts_count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceStatus;

    #[tokio::test]
    async fn fts_finds_inserted_chunk_text() {
        let db = Db::in_memory().await.unwrap();
        let source = db
            .insert_source("https://example.com/a".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();
        db.insert_chunks(
            source.id.clone(),
            vec![(0, 0, 30, "Marie Curie discovered radium.".into(), 6)],
            1,
        )
        .await
        .unwrap();

        let hits = db.search_chunks_fts("radium".into(), None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.contains("radium"));
    }

    #[tokio::test]
    async fn fts_stays_consistent_after_delete() {
        let db = Db::in_memory().await.unwrap();
        let source = db
            .insert_source("https://example.com/b".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();
        db.insert_chunks(
            source.id.clone(),
            vec![(0, 0, 10, "hello world".into(), 2)],
            1,
        )
        .await
        .unwrap();
        assert!(db.verify_fts_consistent().await.unwrap());

        db.with_conn(|conn| {
            conn.execute("DELETE FROM chunks", [])?;
            Ok(())
        })
        .await
        .unwrap();
        assert!(db.verify_fts_consistent().await.unwrap());
    }

    #[tokio::test]
    async fn search_can_be_scoped_to_a_source() {
        let db = Db::in_memory().await.unwrap();
        let s1 = db
            .insert_source("https://example.com/a".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();
        let s2 = db
            .insert_source("https://example.com/c".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();
        db.insert_chunks(s1.id.clone(), vec![(0, 0, 10, "quantum entanglement".into(), 2)], 1)
            .await
            .unwrap();
        db.insert_chunks(s2.id.clone(), vec![(0, 0, 10, "quantum computing".into(), 2)], 1)
            .await
            .unwrap();

        let hits = db
            .search_chunks_fts("quantum".into(), Some(s1.id.clone()), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source_id, s1.id);
    }

    #[tokio::test]
    async fn like_fallback_finds_chunks_by_raw_substring() {
        let db = Db::in_memory().await.unwrap();
        let source = db
            .insert_source("https://example.com/a".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();
        db.insert_chunks(
            source.id.clone(),
            vec![
                (0, 0, 30, "the history of photosynthesis".into(), 4),
                (1, 30, 60, "unrelated chunk about cars".into(), 4),
            ],
            1,
        )
        .await
        .unwrap();

        let hits = db
            .search_chunks_like(vec!["photosynthesis".into()], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("photosynthesis"));
    }

    #[tokio::test]
    async fn like_fallback_with_no_terms_returns_empty() {
        let db = Db::in_memory().await.unwrap();
        let hits = db.search_chunks_like(Vec::new(), 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
