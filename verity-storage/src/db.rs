use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};
use verity_common::error::AppError;

use crate::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};

/// A `rusqlite::Connection`, shared and driven from blocking tasks so the
/// async crates above this one never block their executor thread on SQLite
/// I/O.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Db {
    /// Opens (creating if absent) the SQLite database at `path`, applying
    /// pragmas and running `init()`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let path_for_blocking = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, AppError> {
            if let Some(parent) = path_for_blocking.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(&path_for_blocking)?;
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            Ok(conn)
        })
        .await??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        };
        db.init().await?;
        Ok(db)
    }

    /// Opens an in-memory database, for tests.
    pub async fn in_memory() -> Result<Self, AppError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, AppError> {
            let conn = Connection::open_in_memory()?;
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
            Ok(conn)
        })
        .await??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        db.init().await?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` against the underlying connection on a blocking thread.
    /// Every storage operation in this crate goes through this helper so
    /// locking and `spawn_blocking` dispatch lives in one place.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("db connection mutex poisoned");
            f(&guard)
        })
        .await?
    }

    async fn init(&self) -> Result<(), AppError> {
        self.with_conn(|conn| {
            let is_init: i64 = conn.query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))?;

            if is_init == 0 {
                conn.execute_batch(SCHEMA_SQL)?;
                conn.execute(SET_VERSION_SQL, [CURRENT_SCHEMA_VERSION.to_string()])?;
            } else {
                let current: Option<String> = conn
                    .query_row(GET_VERSION_SQL, [], |row| row.get(0))
                    .optional()?;
                let current: u32 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
                if current < CURRENT_SCHEMA_VERSION {
                    for migration in crate::schema::get_migrations_from(current) {
                        conn.execute_batch(migration.sql)?;
                    }
                    conn.execute(SET_VERSION_SQL, [CURRENT_SCHEMA_VERSION.to_string()])?;
                }
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_db_initializes_schema() {
        let db = Db::in_memory().await.unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sources'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn open_creates_parent_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("verity.db");
        let db = Db::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verity.db");
        let _db1 = Db::open(&path).await.unwrap();
        let db2 = Db::open(&path).await.unwrap();
        let count: i64 = db2
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM schema_info", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert!(count >= 1);
    }
}
