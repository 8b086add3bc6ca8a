use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserMessage {
    pub message_id: MessageId,
    pub session_id: SessionId,
    pub message_text: String,
    pub sent_at: DateTime<Utc>,
}
