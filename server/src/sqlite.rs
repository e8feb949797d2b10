//! SQLite backend for the document store.
//!
//! Messages and users live in two tables that are created on connect:
//!
//! ```sql
//! messages(id TEXT, text TEXT, username TEXT, created_at INTEGER)  -- ms since epoch
//! users(id TEXT PRIMARY KEY, email TEXT, profile TEXT)             -- profile is a JSON object
//! ```
//!
//! Message ids are not unique; ordering ties are broken by `rowid`, which
//! follows insertion order.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::store::{MessageStore, StoreError, UserStore};
use crate::types::{Message, User};

/// Connection cap for file-backed databases.
const MAX_CONNECTIONS: u32 = 5;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Document store backed by a sqlx SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens the database at `url` and creates the schema if needed.
    ///
    /// `sqlite::memory:` is supported; the pool is then pinned to a single
    /// connection that is never recycled, since every connection would
    /// otherwise see its own empty database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the URL is malformed, the file
    /// cannot be opened, or the schema cannot be created.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                username TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages (created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                profile TEXT NOT NULL DEFAULT '{}'
            )",
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite schema ready");
        Ok(())
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
    let created_at_ms: i64 = row.try_get("created_at")?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
        StoreError::backend(format!("created_at out of range: {created_at_ms}"))
    })?;

    Ok(Message {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        username: row.try_get("username")?,
        created_at,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    let profile_json: String = row.try_get("profile")?;
    let profile: Map<String, Value> = serde_json::from_str(&profile_json)
        .map_err(|e| StoreError::backend(format!("corrupt profile column: {e}")))?;

    let user = User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        profile,
    };
    Ok(user.without_reserved_fields())
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert(&self, message: Message) -> Result<Message, StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, text, username, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.text)
        .bind(&message.username)
        .bind(message.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(message_id = %message.id, "Message stored");
        Ok(message)
    }

    async fn find_all(&self) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query("SELECT id, text, username, created_at FROM messages")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn find_all_sorted(&self) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, text, username, created_at FROM messages
             ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, profile FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let user = user.without_reserved_fields();
        let profile = serde_json::to_string(&user.profile)
            .map_err(|e| StoreError::backend(format!("failed to encode profile: {e}")))?;

        sqlx::query("INSERT OR REPLACE INTO users (id, email, profile) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(profile)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }
}
