use rusqlite::{params, OptionalExtension};
use verity_common::error::AppError;
use verity_common::ids::new_ulid_string;

use crate::db::Db;
use crate::types::{Source, SourceContent, SourceStatus};

impl Db {
    /// Inserts a new `Source` row. Conflict-do-nothing on `url`.
    /// Returns the existing source if one already has this URL.
    pub async fn insert_source(
        &self,
        url: String,
        domain: String,
        status: SourceStatus,
        created_at: i64,
    ) -> Result<Source, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            let inserted = conn.execute(
                "INSERT INTO sources (id, url, domain, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(url) DO NOTHING",
                params![id, url, domain, status.as_str(), created_at],
            )?;

            if inserted == 0 {
                return get_source_by_url_sync(conn, &url)?
                    .ok_or_else(|| AppError::Internal("source insert raced with no row".into()));
            }

            Ok(Source {
                id,
                url,
                domain,
                title: None,
                published_at: None,
                crawled_at: None,
                lang: None,
                fingerprint: None,
                status,
                http_status: None,
                created_at,
            })
        })
        .await
    }

    pub async fn get_source_by_url(&self, url: String) -> Result<Option<Source>, AppError> {
        self.with_conn(move |conn| get_source_by_url_sync(conn, &url))
            .await
    }

    pub async fn get_source_by_id(&self, id: String) -> Result<Option<Source>, AppError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, url, domain, title, published_at, crawled_at, lang, fingerprint,
                        status, http_status, created_at
                 FROM sources WHERE id = ?1",
                params![id],
                row_to_source,
            )
            .optional()
            .map_err(AppError::from)
        })
        .await
    }

    pub async fn update_source_status(
        &self,
        id: String,
        status: SourceStatus,
        http_status: Option<i64>,
    ) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE sources SET status = ?1, http_status = ?2 WHERE id = ?3",
                params![status.as_str(), http_status, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_source_content(
        &self,
        source_id: String,
        text: String,
        html: Option<String>,
    ) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO source_content (source_id, text, html) VALUES (?1, ?2, ?3)
                 ON CONFLICT(source_id) DO UPDATE SET text = excluded.text, html = excluded.html",
                params![source_id, text, html],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_source_content(
        &self,
        source_id: String,
    ) -> Result<Option<SourceContent>, AppError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT source_id, text, html FROM source_content WHERE source_id = ?1",
                params![source_id],
                |row| {
                    Ok(SourceContent {
                        source_id: row.get(0)?,
                        text: row.get(1)?,
                        html: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(AppError::from)
        })
        .await
    }
}

fn get_source_by_url_sync(
    conn: &rusqlite::Connection,
    url: &str,
) -> Result<Option<Source>, AppError> {
    conn.query_row(
        "SELECT id, url, domain, title, published_at, crawled_at, lang, fingerprint,
                status, http_status, created_at
         FROM sources WHERE url = ?1",
        params![url],
        row_to_source,
    )
    .optional()
    .map_err(AppError::from)
}

fn row_to_source(row: &rusqlite::Row) -> rusqlite::Result<Source> {
    let status: String = row.get(8)?;
    Ok(Source {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        title: row.get(3)?,
        published_at: row.get(4)?,
        crawled_at: row.get(5)?,
        lang: row.get(6)?,
        fingerprint: row.get(7)?,
        status: SourceStatus::parse(&status).unwrap_or(SourceStatus::Pending),
        http_status: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserting_same_url_twice_leaves_one_row() {
        let db = Db::in_memory().await.unwrap();
        let a = db
            .insert_source(
                "https://example.com/a?a=1&b=2".into(),
                "example.com".into(),
                SourceStatus::Ready,
                100,
            )
            .await
            .unwrap();
        let b = db
            .insert_source(
                "https://example.com/a?a=1&b=2".into(),
                "example.com".into(),
                SourceStatus::Ready,
                200,
            )
            .await
            .unwrap();
        assert_eq!(a.id, b.id);

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM sources", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn source_content_upsert_replaces_text() {
        let db = Db::in_memory().await.unwrap();
        let source = db
            .insert_source(
                "https://example.com/x".into(),
                "example.com".into(),
                SourceStatus::Ready,
                1,
            )
            .await
            .unwrap();

        db.upsert_source_content(source.id.clone(), "first".into(), None)
            .await
            .unwrap();
        db.upsert_source_content(source.id.clone(), "second".into(), None)
            .await
            .unwrap();

        let content = db.get_source_content(source.id).await.unwrap().unwrap();
        assert_eq!(content.text, "second");
    }
}
