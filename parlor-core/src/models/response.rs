use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use super::message::MessageId;

/// Trigger recorded for replies produced by direct model inference.
pub const DEFAULT_TRIGGER_NAME: &str = "model_response";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ResponseId(pub i64);

/// Free-form metadata stored in `bot_responses.trigger_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDetails {
    pub model: String,
    pub response_time: DateTime<Utc>,
    pub trigger_type: String,
}

impl TriggerDetails {
    /// Details for a reply the model produced on its own.
    pub fn auto(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_time: Utc::now(),
            trigger_type: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BotResponse {
    pub response_id: ResponseId,
    pub message_id: MessageId,
    pub response_text: String,
    pub trigger_name: String,
    pub trigger_details: Option<Json<serde_json::Value>>,
    pub sent_at: DateTime<Utc>,
}
