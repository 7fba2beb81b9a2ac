use rusqlite::params;
use verity_common::error::AppError;
use verity_common::ids::new_ulid_string;

use crate::db::Db;
use crate::types::SearchEvent;

impl Db {
    /// Records a search call for audit purposes.
    pub async fn insert_search_event(
        &self,
        thread_id: Option<String>,
        query: String,
        results_json: String,
        created_at: i64,
    ) -> Result<SearchEvent, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO search_events (id, thread_id, query, results_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, thread_id, query, results_json, created_at],
            )?;
            Ok(SearchEvent {
                id,
                thread_id,
                query,
                results_json,
                created_at,
            })
        })
        .await
    }

    pub async fn list_search_events_by_thread(
        &self,
        thread_id: String,
    ) -> Result<Vec<SearchEvent>, AppError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, query, results_json, created_at
                 FROM search_events WHERE thread_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![thread_id], |row| {
                    Ok(SearchEvent {
                        id: row.get(0)?,
                        thread_id: row.get(1)?,
                        query: row.get(2)?,
                        results_json: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_events_are_ordered_and_scoped_to_thread() {
        let db = Db::in_memory().await.unwrap();
        let thread = db.create_thread(None, None, 1).await.unwrap();
        db.insert_search_event(Some(thread.id.clone()), "q1".into(), "[]".into(), 1)
            .await
            .unwrap();
        db.insert_search_event(Some(thread.id.clone()), "q2".into(), "[]".into(), 2)
            .await
            .unwrap();
        db.insert_search_event(None, "unrelated".into(), "[]".into(), 3)
            .await
            .unwrap();

        let events = db.list_search_events_by_thread(thread.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].query, "q1");
    }
}
