//! Model loader — one background load per process, readiness published via `watch`
//!
//! Phases: `Unloaded → Loading → Ready | Failed`. `Ready` is terminal and
//! carries the shared generator handle; readers clone a snapshot of the
//! current phase instead of touching any mutable model state.

use parlor_core::{DisplayTuple, GenerationError, ParlorError, TextGenerator};
use std::sync::Arc;
use tokio::sync::watch;

use crate::pipeline::DisplayLabels;
use crate::subsystems::dispatcher::ResultSender;

#[derive(Clone)]
pub enum ModelPhase {
    Unloaded,
    Loading,
    Ready(Arc<dyn TextGenerator>),
    Failed(String),
}

impl ModelPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ModelPhase::Unloaded => "unloaded",
            ModelPhase::Loading => "loading",
            ModelPhase::Ready(_) => "ready",
            ModelPhase::Failed(_) => "failed",
        }
    }

    /// True once loading has ended either way.
    pub fn is_settled(&self) -> bool {
        matches!(self, ModelPhase::Ready(_) | ModelPhase::Failed(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelPhase::Ready(_))
    }
}

impl std::fmt::Debug for ModelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelPhase::Ready(generator) => f
                .debug_tuple("Ready")
                .field(&generator.model_name())
                .finish(),
            ModelPhase::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
            other => f.write_str(other.label()),
        }
    }
}

/// Shared readiness state. Clones observe the same phase.
#[derive(Clone)]
pub struct ModelLoader {
    state: Arc<watch::Sender<ModelPhase>>,
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("phase", &*self.state.borrow())
            .finish()
    }
}

impl ModelLoader {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ModelPhase::Unloaded);
        Self {
            state: Arc::new(tx),
        }
    }

    /// A loader that is already `Ready` with the given generator.
    pub fn ready_with(generator: Arc<dyn TextGenerator>) -> Self {
        let (tx, _rx) = watch::channel(ModelPhase::Ready(generator));
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn phase(&self) -> ModelPhase {
        self.state.borrow().clone()
    }

    /// The generator handle, or `NotReady` while unloaded, loading or failed.
    pub fn handle(&self) -> Result<Arc<dyn TextGenerator>, ParlorError> {
        match &*self.state.borrow() {
            ModelPhase::Ready(generator) => Ok(Arc::clone(generator)),
            other => Err(ParlorError::NotReady(other.label().to_string())),
        }
    }

    /// Start the one-and-only load on the blocking pool.
    ///
    /// Returns `false` without doing anything if a load was already started.
    /// The outcome is published as the new phase and announced to the user
    /// through `results`. Must be called from within a Tokio runtime.
    pub fn spawn_load<F>(&self, load: F, results: ResultSender, labels: DisplayLabels) -> bool
    where
        F: FnOnce() -> Result<Arc<dyn TextGenerator>, GenerationError> + Send + 'static,
    {
        if !self.begin_loading() {
            tracing::warn!(phase = self.phase().label(), "Model load already started, ignoring");
            return false;
        }

        let loader = self.clone();
        tokio::spawn(async move {
            let outcome = match tokio::task::spawn_blocking(load).await {
                Ok(Ok(generator)) => Ok(generator),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("loader task failed: {e}")),
            };

            match outcome {
                Ok(generator) => {
                    tracing::info!(model = generator.model_name(), "Model ready");
                    // Publish before announcing: anything sent after the notice sees Ready.
                    loader.finish(ModelPhase::Ready(generator));
                    results.push(DisplayTuple::system(
                        &labels.system,
                        "Model loaded successfully!",
                    ));
                }
                Err(reason) => {
                    tracing::error!(error = %reason, "Model load failed");
                    let notice = format!("Model load error: {reason}");
                    loader.finish(ModelPhase::Failed(reason));
                    results.push(DisplayTuple::system(&labels.system, notice));
                }
            }
        });

        true
    }

    /// Resolve once the phase is `Ready` or `Failed`.
    pub async fn wait_settled(&self) -> ModelPhase {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(ModelPhase::is_settled).await {
            Ok(phase) => phase.clone(),
            Err(_) => self.phase(),
        };
        settled
    }

    fn begin_loading(&self) -> bool {
        self.state.send_if_modified(|phase| {
            if matches!(phase, ModelPhase::Unloaded) {
                *phase = ModelPhase::Loading;
                true
            } else {
                false
            }
        })
    }

    fn finish(&self, settled: ModelPhase) {
        self.state.send_if_modified(move |phase| {
            if matches!(phase, ModelPhase::Loading) {
                *phase = settled;
                true
            } else {
                false
            }
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================
