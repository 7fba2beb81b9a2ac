use rusqlite::{params, OptionalExtension};
use verity_common::error::AppError;
use verity_common::ids::new_ulid_string;

use crate::db::Db;
use crate::types::Chunk;

impl Db {
    /// Bulk-inserts chunks for a source in a single transaction. Chunks are
    /// created once per source version and never edited afterwards.
    pub async fn insert_chunks(
        &self,
        source_id: String,
        chunks: Vec<(i64, i64, i64, String, i64)>,
        created_at: i64,
    ) -> Result<Vec<Chunk>, AppError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let mut inserted = Vec::with_capacity(chunks.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chunks (id, source_id, pos, char_start, char_end, text, tokens, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for (pos, char_start, char_end, text, tokens) in chunks {
                    let id = new_ulid_string();
                    stmt.execute(params![
                        id, source_id, pos, char_start, char_end, text, tokens, created_at
                    ])?;
                    inserted.push(Chunk {
                        id,
                        source_id: source_id.clone(),
                        pos,
                        char_start,
                        char_end,
                        text,
                        tokens,
                        created_at,
                    });
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    pub async fn list_chunks_by_source(&self, source_id: String) -> Result<Vec<Chunk>, AppError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_id, pos, char_start, char_end, text, tokens, created_at
                 FROM chunks WHERE source_id = ?1 ORDER BY pos ASC",
            )?;
            let rows = stmt
                .query_map(params![source_id], row_to_chunk)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn get_chunk_by_id(&self, id: String) -> Result<Option<Chunk>, AppError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, source_id, pos, char_start, char_end, text, tokens, created_at
                 FROM chunks WHERE id = ?1",
                params![id],
                row_to_chunk,
            )
            .optional()
            .map_err(AppError::from)
        })
        .await
    }

    pub async fn count_chunks_for_source(&self, source_id: String) -> Result<i64, AppError> {
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )?)
        })
        .await
    }
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceStatus;

    #[tokio::test]
    async fn bulk_insert_and_list_preserves_order() {
        let db = Db::in_memory().await.unwrap();
        let source = db
            .insert_source("https://example.com/a".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();

        let rows = vec![
            (0, 0, 10, "first chunk".to_string(), 3),
            (1, 10, 20, "second chunk".to_string(), 3),
        ];
        let inserted = db
            .insert_chunks(source.id.clone(), rows, 10)
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);

        let listed = db.list_chunks_by_source(source.id.clone()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].pos, 0);
        assert_eq!(listed[1].pos, 1);
        assert_eq!(
            db.count_chunks_for_source(source.id).await.unwrap(),
            2
        );
    }
}
