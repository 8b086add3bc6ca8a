//! Chat log store — sessions, user messages and bot responses in SQLite
//!
//! Append-only: the store inserts and reads rows but never updates or
//! deletes them. Every insert is its own autocommit statement, so a row is
//! durable as soon as the call returns.
//!
//! `ChatStore` is cheap to clone; clones share the same single-connection
//! pool, which serializes writers coming from concurrent workers.

use sqlx::SqlitePool;
use std::path::Path;

use crate::db;
use crate::error::ParlorError;
use crate::models::{
    BotResponse, MessageId, ResponseId, RowCounts, Session, SessionId, SessionMeta,
    TranscriptEntry, TriggerDetails, UserMessage,
};

#[derive(Debug, Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Open the log at `path`, creating the file and schema if absent.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ParlorError> {
        let path = path.as_ref();
        let pool = db::create_pool(path).await?;
        db::init_schema(&pool).await?;
        tracing::info!(path = %path.display(), "Chat log opened");
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self, ParlorError> {
        let pool = db::create_memory_pool().await?;
        db::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        meta: &SessionMeta,
    ) -> Result<SessionId, ParlorError> {
        let meta_json = serde_json::to_string(meta)?;

        let id: SessionId = sqlx::query_scalar(
            "INSERT INTO sessions (user_id, additional_meta) VALUES (?1, ?2) RETURNING session_id",
        )
        .bind(user_id)
        .bind(meta_json)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(session_id = %id, user_id, "Session created");
        Ok(id)
    }

    /// Record a message the user submitted. Rejects blank text before touching the database.
    pub async fn log_user_message(
        &self,
        session_id: SessionId,
        text: &str,
    ) -> Result<MessageId, ParlorError> {
        if text.trim().is_empty() {
            return Err(ParlorError::Validation(
                "message text must not be empty".to_string(),
            ));
        }

        let id: MessageId = sqlx::query_scalar(
            "INSERT INTO user_messages (session_id, message_text) VALUES (?1, ?2) RETURNING message_id",
        )
        .bind(session_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(session_id = %session_id, message_id = %id, "User message logged");
        Ok(id)
    }

    /// Record the reply to `message_id`. Fails with a storage error if the message does not exist.
    pub async fn log_bot_response(
        &self,
        message_id: MessageId,
        text: &str,
        trigger_name: &str,
        details: &TriggerDetails,
    ) -> Result<ResponseId, ParlorError> {
        let details_json = serde_json::to_string(details)?;

        let id: ResponseId = sqlx::query_scalar(
            r#"
            INSERT INTO bot_responses (message_id, response_text, trigger_name, trigger_details)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING response_id
            "#,
        )
        .bind(message_id)
        .bind(text)
        .bind(trigger_name)
        .bind(details_json)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(message_id = %message_id, trigger = trigger_name, "Bot response logged");
        Ok(id)
    }

    pub async fn session(&self, session_id: SessionId) -> Result<Option<Session>, ParlorError> {
        let row = sqlx::query_as::<_, Session>(
            "SELECT session_id, created_at, user_id, additional_meta FROM sessions WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Newest sessions first.
    pub async fn recent_sessions(&self, limit: u32) -> Result<Vec<Session>, ParlorError> {
        let rows = sqlx::query_as::<_, Session>(
            r#"
            SELECT session_id, created_at, user_id, additional_meta
            FROM sessions
            ORDER BY session_id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Messages of a session in insertion order.
    pub async fn messages_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<UserMessage>, ParlorError> {
        let rows = sqlx::query_as::<_, UserMessage>(
            r#"
            SELECT message_id, session_id, message_text, sent_at
            FROM user_messages
            WHERE session_id = ?1
            ORDER BY message_id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn responses_for_message(
        &self,
        message_id: MessageId,
    ) -> Result<Vec<BotResponse>, ParlorError> {
        let rows = sqlx::query_as::<_, BotResponse>(
            r#"
            SELECT response_id, message_id, response_text, trigger_name, trigger_details, sent_at
            FROM bot_responses
            WHERE message_id = ?1
            ORDER BY response_id ASC
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every message of a session paired with its reply. Messages that never
    /// got one (model not ready, generation failure) carry `None`.
    pub async fn transcript(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TranscriptEntry>, ParlorError> {
        let messages = self.messages_for_session(session_id).await?;

        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            let response = self
                .responses_for_message(message.message_id)
                .await?
                .into_iter()
                .next();
            entries.push(TranscriptEntry { message, response });
        }
        Ok(entries)
    }

    pub async fn row_counts(&self) -> Result<RowCounts, ParlorError> {
        let (sessions, user_messages, bot_responses): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sessions),
                (SELECT COUNT(*) FROM user_messages),
                (SELECT COUNT(*) FROM bot_responses)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(RowCounts {
            sessions,
            user_messages,
            bot_responses,
        })
    }

    /// Release the database. Waits for any write already holding the
    /// connection to finish; later calls on any clone fail with a storage error.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        self.pool.close().await;
        tracing::info!("Chat log closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

// ============================================================================
// TESTS
// ============================================================================
