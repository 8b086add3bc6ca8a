//! ONNX generation backend — local causal-LM inference
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for BPE tokenization.
//! Expects a decoder-only model exported without past key/values: every step
//! re-runs the full sequence and reads the logits of the last position.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::{Arc, Mutex};

use crate::config::ModelConfig;
use crate::generation::{
    render_prompt, sample_next_token, GenerationError, SamplingConfig, TextGenerator,
};

/// Local ONNX text generator. One inference runs at a time; concurrent
/// callers queue on the session lock.
pub struct OnnxGenerator {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    params: Arc<GenerationParams>,
    model_name: String,
}

/// Everything the blocking generation loop needs besides the model itself.
#[derive(Debug, Clone)]
struct GenerationParams {
    prompt_template: String,
    sampling: SamplingConfig,
    max_context_tokens: usize,
    eos_token_id: Option<u32>,
    use_position_ids: bool,
}

impl std::fmt::Debug for OnnxGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxGenerator")
            .field("model_name", &self.model_name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl OnnxGenerator {
    /// Load the model and tokenizer from `config.model_dir`.
    ///
    /// Blocking and slow for real models; call it from a blocking task.
    /// Returns `GenerationError::ModelNotFound` if either file is missing.
    pub fn load(config: &ModelConfig) -> Result<Self, GenerationError> {
        let model_path = config.model_path();
        let tokenizer_path = config.tokenizer_path();

        if !model_path.exists() {
            return Err(GenerationError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }
        if !tokenizer_path.exists() {
            return Err(GenerationError::ModelNotFound {
                path: tokenizer_path.display().to_string(),
            });
        }

        let mut builder = Session::builder()
            .map_err(|e| GenerationError::Inference(e.to_string()))?
            .with_intra_threads(intra_threads(config.intra_threads))
            .map_err(|e| GenerationError::Inference(e.to_string()))?;
        let session = builder
            .commit_from_file(&model_path)
            .map_err(|e| GenerationError::Inference(e.to_string()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;

        let eos_token_id = tokenizer.token_to_id(&config.eos_token);
        if eos_token_id.is_none() {
            tracing::warn!(
                eos_token = %config.eos_token,
                "EOS token not in vocabulary; replies will run to max_new_tokens"
            );
        }

        let model_name = config.model_name();
        tracing::info!(model = %model_name, path = %model_path.display(), "ONNX model loaded");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            params: Arc::new(GenerationParams {
                prompt_template: config.prompt_template.clone(),
                sampling: SamplingConfig::from(config),
                max_context_tokens: config.max_context_tokens,
                eos_token_id,
                use_position_ids: config.use_position_ids,
            }),
            model_name,
        })
    }
}

#[async_trait]
impl TextGenerator for OnnxGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        // ONNX inference is CPU-bound; run on the blocking thread pool.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let params = Arc::clone(&self.params);
        let prompt = render_prompt(&params.prompt_template, prompt);

        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| GenerationError::Inference(format!("session lock poisoned: {e}")))?;
            generate_sync(&mut session_guard, &tokenizer, &prompt, &params)
        })
        .await
        .map_err(|e| GenerationError::Worker(format!("spawn_blocking join error: {e}")))?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Autoregressive sampling loop. Returns only the newly generated text, trimmed.
fn generate_sync(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    prompt: &str,
    params: &GenerationParams,
) -> Result<String, GenerationError> {
    // 1. Tokenize
    let encoding = tokenizer
        .encode(prompt, true)
        .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;

    let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    if ids.is_empty() {
        return Err(GenerationError::Tokenizer(
            "prompt produced no tokens".to_string(),
        ));
    }
    let prompt_len = ids.len();
    let mut rng = rand::thread_rng();

    // 2. Sample until EOS, the token budget, or the context window
    for _ in 0..params.sampling.max_new_tokens {
        if ids.len() >= params.max_context_tokens {
            tracing::debug!(len = ids.len(), "Context window full, stopping generation");
            break;
        }

        let logits = next_token_logits(session, &ids, params.use_position_ids)?;
        let next = sample_next_token(&logits, &params.sampling, &mut rng)? as u32;
        if params.eos_token_id == Some(next) {
            break;
        }
        ids.push(i64::from(next));
    }

    // 3. Decode the generated span only
    let generated: Vec<u32> = ids[prompt_len..].iter().map(|&id| id as u32).collect();
    let text = tokenizer
        .decode(&generated, true)
        .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;

    Ok(text.trim().to_string())
}

/// Run one forward pass and return the vocabulary logits for the last position.
fn next_token_logits(
    session: &mut Session,
    ids: &[i64],
    use_position_ids: bool,
) -> Result<Vec<f32>, GenerationError> {
    let seq_len = ids.len();
    let shape = vec![1i64, seq_len as i64];

    // Build input tensors via Tensor::from_array (batch_size=1)
    let input_ids_tensor = Tensor::from_array((shape.clone(), ids.to_vec()))
        .map_err(|e| GenerationError::Inference(e.to_string()))?;
    let attention_mask_tensor = Tensor::from_array((shape.clone(), vec![1i64; seq_len]))
        .map_err(|e| GenerationError::Inference(e.to_string()))?;

    let outputs = if use_position_ids {
        let positions: Vec<i64> = (0..seq_len as i64).collect();
        let position_ids_tensor = Tensor::from_array((shape, positions))
            .map_err(|e| GenerationError::Inference(e.to_string()))?;
        session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "position_ids" => position_ids_tensor,
        })
    } else {
        session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
        })
    }
    .map_err(|e| GenerationError::Inference(e.to_string()))?;

    // try_extract_tensor returns (&Shape, &[f32])
    let (out_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| GenerationError::Inference(e.to_string()))?;

    // [1, seq_len, vocab] for full logits, [1, vocab] for last-step exports
    let (rows, vocab) = match out_shape.len() {
        3 => (out_shape[1] as usize, out_shape[2] as usize),
        2 => (1, out_shape[1] as usize),
        n => {
            return Err(GenerationError::InvalidLogits(format!(
                "expected 2D or 3D logits, got {n}D"
            )))
        }
    };

    let offset = (rows.saturating_sub(1)) * vocab;
    data.get(offset..offset + vocab)
        .map(<[f32]>::to_vec)
        .ok_or_else(|| {
            GenerationError::InvalidLogits(format!(
                "logits buffer of {} values too short for {rows}x{vocab}",
                data.len()
            ))
        })
}

/// Resolve the configured intra-op thread count; 0 means one per CPU.
fn intra_threads(configured: usize) -> usize {
    if configured == 0 {
        num_cpus::get()
    } else {
        configured
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_model_not_found_returns_error() {
        let config = ModelConfig {
            model_dir: PathBuf::from("/nonexistent/chatbot-gpt-model"),
            ..ModelConfig::default()
        };

        let result = OnnxGenerator::load(&config);
        match result {
            Err(GenerationError::ModelNotFound { path }) => {
                assert!(path.ends_with("model.onnx"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_missing_tokenizer_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"placeholder").unwrap();
        let config = ModelConfig {
            model_dir: dir.path().to_path_buf(),
            ..ModelConfig::default()
        };

        match OnnxGenerator::load(&config) {
            Err(GenerationError::ModelNotFound { path }) => {
                assert!(path.ends_with("tokenizer.json"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_intra_threads_zero_uses_cpu_count() {
        assert_eq!(intra_threads(0), num_cpus::get());
        assert_eq!(intra_threads(2), 2);
    }
}
