use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form metadata stored in `sessions.additional_meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub app_version: String,
    pub start_time: DateTime<Utc>,
    pub platform: String,
}

impl SessionMeta {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Utc::now(),
            platform: platform.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub additional_meta: Option<Json<serde_json::Value>>,
}
