//! Storage collaborator traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;

/// History length returned when a caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// A chat message to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChat {
    /// Room the message was posted to.
    pub chatroom: String,
    /// Sender email.
    pub sender: String,
    /// Whether the message is private.
    pub private: bool,
    /// Message body.
    pub message: String,
    /// Sender display name at the time of posting.
    pub username: String,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRecord {
    /// Row id, increasing in insertion order.
    pub id: i64,
    /// Room the message was posted to.
    pub chatroom: String,
    /// Sender email.
    pub sender: String,
    /// Whether the message is private.
    pub private: bool,
    /// Message body.
    pub message: String,
    /// When the database stored the message (UTC).
    pub created: DateTime<Utc>,
    /// Sender display name at the time of posting.
    pub username: String,
}

/// Persists chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store one message.
    async fn insert_message(&self, chat: NewChat) -> Result<()>;

    /// The newest `limit` messages of `chatroom`, oldest first.
    async fn recent_messages(&self, chatroom: &str, limit: usize) -> Result<Vec<ChatRecord>>;
}

/// Resolves the display name registered for an email.
#[async_trait]
pub trait DisplayNames: Send + Sync {
    /// `None` when no user is registered under `email`.
    async fn display_name(&self, email: &str) -> Result<Option<String>>;
}
