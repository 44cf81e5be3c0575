//! Message history repository

use chrono::{DateTime, Utc};

use super::{DbConn, DbPool};
use crate::{Error, Result};

/// A stored conversation message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    /// Summaries of earlier conversation
    System,
}

impl MessageRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Speaker label used when rendering a transcript
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "Summary",
        }
    }
}

/// Message history repository
#[derive(Clone)]
pub struct HistoryRepo {
    pool: DbPool,
}

impl HistoryRepo {
    /// Create a new history repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// Append a message to a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let conn = self.conn()?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![session_id, role.as_str(), content, now.to_rfc3339()],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Message {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Append a user/assistant pair atomically
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add_turn(&self, session_id: &str, user: &str, assistant: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        for (role, content) in [(MessageRole::User, user), (MessageRole::Assistant, assistant)] {
            tx.execute(
                "INSERT INTO messages (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![session_id, role.as_str(), content, &now],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::Database(e.to_string()))
    }

    /// Most recent user/assistant messages, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent_dialogue(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, role, content, created_at
                 FROM messages WHERE session_id = ?1 AND role != 'system'
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let messages = stmt
            .query_map(rusqlite::params![session_id, limit], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: MessageRole::from_str(&row.get::<_, String>(2)?)
                        .unwrap_or(MessageRole::User),
                    content: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        Ok(messages)
    }

    /// Content of the latest summary stored for a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn latest_summary(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;

        let summary = conn
            .query_row(
                "SELECT content FROM messages
                 WHERE session_id = ?1 AND role = 'system'
                 ORDER BY id DESC LIMIT 1",
                [session_id],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(Error::Database(other.to_string())),
            })?;

        Ok(summary)
    }

    /// Delete a session's user/assistant messages, keeping its summaries
    ///
    /// Returns how many messages were removed.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn clear_dialogue(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;

        conn.execute(
            "DELETE FROM messages WHERE session_id = ?1 AND role != 'system'",
            [session_id],
        )
        .map_err(|e| Error::Database(e.to_string()))
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
