//! `SQLite`-backed implementation of the storage collaborators.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::migrations;
use crate::pool::{self, ConnectionPool, PoolConfig};
use crate::traits::{ChatRecord, DisplayNames, MessageStore, NewChat};

/// Chat storage on a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Wrap an existing pool. Call [`SqliteStore::migrate`] before use.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &Path, config: &PoolConfig) -> Result<Self> {
        let store = Self::new(pool::new_file(path, config)?);
        let _ = store.migrate()?;
        Ok(store)
    }

    /// A migrated in-memory database.
    pub fn in_memory() -> Result<Self> {
        let store = Self::new(pool::new_in_memory(&PoolConfig::default())?);
        let _ = store.migrate()?;
        Ok(store)
    }

    /// Apply pending schema migrations. Returns how many ran.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.pool.get()?;
        migrations::run_migrations(&conn)
    }

    /// Register or rename a user.
    pub async fn upsert_user(&self, email: &str, name: &str) -> Result<()> {
        let email = email.to_owned();
        let name = name.to_owned();
        self.with_conn(move |conn| {
            let _ = conn.execute(
                "INSERT INTO users (email, name) VALUES (?1, ?2)
                 ON CONFLICT(email) DO UPDATE SET name = excluded.name",
                params![email, name],
            )?;
            Ok(())
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("storage task failed: {e}")))?
    }

    fn map_chat(row: &Row<'_>) -> rusqlite::Result<ChatRecord> {
        let created: String = row.get(5)?;
        let created = DateTime::parse_from_rfc3339(&created)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        Ok(ChatRecord {
            id: row.get(0)?,
            chatroom: row.get(1)?,
            sender: row.get(2)?,
            private: row.get(3)?,
            message: row.get(4)?,
            created,
            username: row.get(6)?,
        })
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, chat: NewChat) -> Result<()> {
        debug!(chatroom = %chat.chatroom, sender = %chat.sender, "storing chat message");
        self.with_conn(move |conn| {
            let _ = conn.execute(
                "INSERT INTO chats (chatroom, sender, private, message, username)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    chat.chatroom,
                    chat.sender,
                    chat.private,
                    chat.message,
                    chat.username
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_messages(&self, chatroom: &str, limit: usize) -> Result<Vec<ChatRecord>> {
        let chatroom = chatroom.to_owned();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chatroom, sender, private, message, created, username FROM (
                     SELECT * FROM chats WHERE chatroom = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![chatroom, limit], Self::map_chat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl DisplayNames for SqliteStore {
    async fn display_name(&self, email: &str) -> Result<Option<String>> {
        let email = email.to_owned();
        self.with_conn(move |conn| {
            let name = conn
                .query_row(
                    "SELECT name FROM users WHERE email = ?1",
                    params![email],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(name)
        })
        .await
    }
}
