//! Text generation — backend trait, sampling and prompt template
//!
//! `TextGenerator` is the seam between the chat pipeline and whatever
//! produces replies. The ONNX causal-LM backend lives in `onnx_generator`;
//! tests plug in their own implementations.
//!
//! Sampling follows the usual order: temperature scaling, top-k filter,
//! softmax, nucleus (top-p) cut, then a weighted random draw.

use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use thiserror::Error;

use crate::config::ModelConfig;

/// Placeholder replaced by the user's message in the prompt template.
pub const MESSAGE_PLACEHOLDER: &str = "{message}";

// ============================================================================
// TextGenerator trait
// ============================================================================

/// A loaded model able to answer a prompt. Shared read-only across workers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a reply to the raw user message. Output is stochastic:
    /// identical prompts may yield different replies.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Model identifier recorded alongside each response.
    fn model_name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Model artifact not found at {path}")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    Inference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid logits: {0}")]
    InvalidLogits(String),

    #[error("Generation worker failed: {0}")]
    Worker(String),
}

// ============================================================================
// Sampling
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub max_new_tokens: usize,
    /// 0 disables the top-k filter.
    pub top_k: usize,
    pub top_p: f32,
    /// 0 or below means greedy decoding.
    pub temperature: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for SamplingConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            top_k: config.top_k,
            top_p: config.top_p,
            temperature: config.temperature,
        }
    }
}

/// Pick the next token id from a row of vocabulary logits.
pub fn sample_next_token<R: Rng + ?Sized>(
    logits: &[f32],
    config: &SamplingConfig,
    rng: &mut R,
) -> Result<usize, GenerationError> {
    let mut candidates: Vec<(usize, f32)> = logits
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .collect();

    if candidates.is_empty() {
        return Err(GenerationError::InvalidLogits(format!(
            "no finite values among {} logits",
            logits.len()
        )));
    }

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    if config.temperature <= 0.0 {
        return Ok(candidates[0].0);
    }

    if config.top_k > 0 {
        candidates.truncate(config.top_k);
    }

    // Softmax over the surviving candidates; the first one holds the max.
    let max_logit = candidates[0].1;
    let mut probs: Vec<f32> = candidates
        .iter()
        .map(|(_, l)| ((l - max_logit) / config.temperature).exp())
        .collect();
    let sum: f32 = probs.iter().sum();
    for p in probs.iter_mut() {
        *p /= sum;
    }

    // Nucleus: smallest prefix whose mass reaches top_p, never empty.
    if config.top_p < 1.0 {
        let mut cumulative = 0.0;
        let mut keep = 0;
        for p in &probs {
            cumulative += p;
            keep += 1;
            if cumulative >= config.top_p {
                break;
            }
        }
        probs.truncate(keep.max(1));
    }

    let dist =
        WeightedIndex::new(&probs).map_err(|e| GenerationError::InvalidLogits(e.to_string()))?;
    Ok(candidates[dist.sample(rng)].0)
}

/// Wrap a raw user message in the model's prompt template.
pub fn render_prompt(template: &str, message: &str) -> String {
    if template.contains(MESSAGE_PLACEHOLDER) {
        template.replace(MESSAGE_PLACEHOLDER, message)
    } else {
        format!("{template}{message}")
    }
}

// ============================================================================
// TESTS
// ============================================================================
