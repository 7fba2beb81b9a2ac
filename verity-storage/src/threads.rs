use rusqlite::{params, OptionalExtension};
use verity_common::error::AppError;
use verity_common::ids::new_ulid_string;

use crate::db::Db;
use crate::types::{Message, MessageRole, Thread};

impl Db {
    pub async fn create_thread(
        &self,
        title: Option<String>,
        visitor_id: Option<String>,
        created_at: i64,
    ) -> Result<Thread, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO threads (id, title, visitor_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, title, visitor_id, created_at],
            )?;
            Ok(Thread {
                id,
                title,
                visitor_id,
                created_at,
            })
        })
        .await
    }

    pub async fn get_thread(&self, id: String) -> Result<Option<Thread>, AppError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, title, visitor_id, created_at FROM threads WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Thread {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        visitor_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(AppError::from)
        })
        .await
    }

    pub async fn insert_message(
        &self,
        thread_id: String,
        role: MessageRole,
        content_md: String,
        created_at: i64,
    ) -> Result<Message, AppError> {
        self.with_conn(move |conn| {
            let id = new_ulid_string();
            conn.execute(
                "INSERT INTO messages (id, thread_id, role, content_md, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, thread_id, role.as_str(), content_md, created_at],
            )?;
            Ok(Message {
                id,
                thread_id,
                role,
                content_md,
                created_at,
            })
        })
        .await
    }

    pub async fn list_messages(&self, thread_id: String) -> Result<Vec<Message>, AppError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, role, content_md, created_at
                 FROM messages WHERE thread_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![thread_id], |row| {
                    let role: String = row.get(2)?;
                    Ok(Message {
                        id: row.get(0)?,
                        thread_id: row.get(1)?,
                        role: MessageRole::parse(&role).unwrap_or(MessageRole::System),
                        content_md: row.get(3)?,
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
    async fn messages_are_ordered_by_creation() {
        let db = Db::in_memory().await.unwrap();
        let thread = db.create_thread(Some("t".into()), None, 1).await.unwrap();
        db.insert_message(thread.id.clone(), MessageRole::User, "hi".into(), 1)
            .await
            .unwrap();
        db.insert_message(thread.id.clone(), MessageRole::Assistant, "hello".into(), 2)
            .await
            .unwrap();

        let messages = db.list_messages(thread.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }
}
