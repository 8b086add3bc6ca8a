use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ParlorError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ParlorConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    pub user_id: String,
    pub platform: String,
    pub poll_interval_ms: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            user_id: "default_user".to_string(),
            platform: "desktop".to_string(),
            poll_interval_ms: 100,
            shutdown_grace_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chat_logs.db"),
        }
    }
}

/// Model artifacts and sampling parameters.
///
/// `model_dir` must contain `model.onnx` (a causal LM exported with a
/// `logits` output) and `tokenizer.json`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub prompt_template: String,
    pub max_new_tokens: usize,
    pub max_context_tokens: usize,
    pub top_k: usize,
    pub top_p: f32,
    pub temperature: f32,
    pub eos_token: String,
    /// 0 means one thread per CPU.
    pub intra_threads: usize,
    pub use_position_ids: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./chatbot-gpt-model"),
            prompt_template: "Ввод: {message}\nОтвет:".to_string(),
            max_new_tokens: 100,
            max_context_tokens: 1024,
            top_k: 50,
            top_p: 0.95,
            temperature: 0.8,
            eos_token: "<|endoftext|>".to_string(),
            intra_threads: 0,
            use_position_ids: false,
        }
    }
}

impl ModelConfig {
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }

    /// Display name recorded in `trigger_details.model`.
    pub fn model_name(&self) -> String {
        self.model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "onnx".to_string())
    }
}

/// Sender labels and canned notices shown to the user.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub user_label: String,
    pub bot_label: String,
    pub system_label: String,
    pub greeting: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            user_label: "You".to_string(),
            bot_label: "AI Assistant".to_string(),
            system_label: "System".to_string(),
            greeting: Some("Hi! I'm your virtual assistant. How can I help?".to_string()),
        }
    }
}

impl ParlorConfig {
    pub fn load(path: &str) -> Result<Self, ParlorError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
