pub mod message;
pub mod response;
pub mod session;

pub use message::{MessageId, UserMessage};
pub use response::{BotResponse, ResponseId, TriggerDetails, DEFAULT_TRIGGER_NAME};
pub use session::{Session, SessionId, SessionMeta};

use serde::Serialize;

/// One user message paired with the bot response it received, if any.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub message: UserMessage,
    pub response: Option<BotResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub sessions: i64,
    pub user_messages: i64,
    pub bot_responses: i64,
}
