//! SQLite user table with bcrypt password hashes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hinnat_vfs::Identity;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::{AuthError, Authenticator};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL DEFAULT (unixepoch())
);
"#;

/// A row of the users table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_active: bool,
    pub created_at: i64,
}

/// Database handle for gateway users.
#[derive(Clone)]
pub struct UserDb {
    conn: Arc<Mutex<Connection>>,
    cost: u32,
}

impl UserDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_conn(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, AuthError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost for newly hashed passwords.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Add a user, or replace the password of an existing one.
    pub fn add_user(&self, username: &str, password: &str) -> Result<i64, AuthError> {
        let hash = bcrypt::hash(password, self.cost)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)
             ON CONFLICT (username) DO UPDATE SET password_hash = excluded.password_hash",
            params![username, hash],
        )?;
        let id = conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Enable or disable a user. Returns false if the user doesn't exist.
    pub fn set_active(&self, username: &str, active: bool) -> Result<bool, AuthError> {
        let changed = self.conn.lock().execute(
            "UPDATE users SET is_active = ?1 WHERE username = ?2",
            params![active, username],
        )?;
        Ok(changed > 0)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>, AuthError> {
        let user = self
            .conn
            .lock()
            .query_row(
                "SELECT id, username, is_active, created_at FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_active: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>, AuthError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, username, is_active, created_at FROM users ORDER BY username",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                is_active: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let users = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Check a password against an active user's stored hash.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let hash: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?1 AND is_active = 1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        match hash {
            Some(hash) => Ok(bcrypt::verify(password, &hash)?),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Authenticator for UserDb {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let db = self.clone();
        let user = username.to_string();
        let password = password.to_string();
        let ok = tokio::task::spawn_blocking(move || db.verify(&user, &password))
            .await
            .map_err(|e| AuthError::Unavailable(format!("spawn_blocking: {}", e)))??;

        if !ok {
            tracing::warn!(user = %username, "database authentication failed");
            return Err(AuthError::InvalidCredentials(username.to_string()));
        }
        tracing::info!(user = %username, "database authentication succeeded");
        // Database-backed adapters never see the password; hand out a
        // per-session token instead.
        Ok(Identity::new(username, Uuid::new_v4().to_string()))
    }
}
