use thiserror::Error;

use crate::generation::GenerationError;

#[derive(Error, Debug)]
pub enum ParlorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Model not ready ({0})")]
    NotReady(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Chat pipeline stopped")]
    Stopped,
}

impl ParlorError {
    /// True for failures that originate in the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, ParlorError::Storage(_))
    }
}
