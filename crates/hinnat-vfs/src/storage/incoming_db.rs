//! SQLite-backed incoming store.
//!
//! One row per `(username, filename)`. A re-upload replaces the row.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::identity::Identity;
use crate::vfs::Entry;

use super::{IncomingStore, StorageError, StorageResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS incoming_files (
    username TEXT NOT NULL,
    filename TEXT NOT NULL,
    content BLOB NOT NULL,
    size INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (unixepoch()),
    PRIMARY KEY (username, filename)
);
"#;

/// Incoming store persisting uploads in an `incoming_files` table.
#[derive(Clone)]
pub struct SqliteIncomingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIncomingStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace a file.
    pub fn upsert(&self, username: &str, filename: &str, content: &[u8]) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT INTO incoming_files (username, filename, content, size)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (username, filename) DO UPDATE SET
                content = excluded.content,
                size = excluded.size,
                created_at = unixepoch()",
            params![username, filename, content, content.len() as i64],
        )?;
        Ok(())
    }

    /// Files stored for a user, ordered by filename.
    pub fn files_for(&self, username: &str) -> StorageResult<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT filename, size, created_at FROM incoming_files
             WHERE username = ?1 ORDER BY filename ASC",
        )?;
        let rows = stmt.query_map(params![username], |row| {
            let name: String = row.get(0)?;
            let size: i64 = row.get(1)?;
            let created_at: i64 = row.get(2)?;
            Ok(Entry::file(
                name,
                size.max(0) as u64,
                UNIX_EPOCH + Duration::from_secs(created_at.max(0) as u64),
            ))
        })?;
        let files = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Stored content of one file.
    pub fn content(&self, username: &str, filename: &str) -> StorageResult<Option<Vec<u8>>> {
        let content = self
            .conn
            .lock()
            .query_row(
                "SELECT content FROM incoming_files WHERE username = ?1 AND filename = ?2",
                params![username, filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteIncomingStore) -> StorageResult<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(&this))
            .await
            .map_err(|e| StorageError::unavailable(format!("spawn_blocking: {}", e)))?
    }
}

#[async_trait]
impl IncomingStore for SqliteIncomingStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn retains_files(&self) -> bool {
        true
    }

    async fn store(&self, identity: &Identity, filename: &str, content: Vec<u8>) -> StorageResult<()> {
        let username = identity.username().to_string();
        let filename = filename.to_string();
        let size = content.len();
        self.blocking({
            let username = username.clone();
            let filename = filename.clone();
            move |db| db.upsert(&username, &filename, &content)
        })
        .await
        .inspect_err(|e| tracing::error!(user = %username, file = %filename, "failed to store incoming file: {}", e))?;
        tracing::debug!(user = %username, file = %filename, bytes = size, "incoming file saved to database");
        Ok(())
    }

    async fn list(&self, identity: &Identity) -> StorageResult<Vec<Entry>> {
        let username = identity.username().to_string();
        self.blocking(move |db| db.files_for(&username)).await
    }
}
