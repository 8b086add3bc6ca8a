//! Chat pipeline — the boundary the presentation layer talks to
//!
//! The interface hands text to `submit_message` and polls the `Dispatcher`
//! it got from `bootstrap`. Everything slow (logging, loading, generation)
//! happens on background tasks, so neither call blocks the caller.

use parlor_core::config::DisplayConfig;
use parlor_core::models::SessionMeta;
use parlor_core::{
    ChatStore, DisplayTuple, OnnxGenerator, ParlorConfig, ParlorError, SessionId, TextGenerator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

use crate::subsystems::dispatcher::{result_channel, Dispatcher, ResultSender};
use crate::subsystems::intake::{self, IntakeSender, Submission};
use crate::subsystems::loader::ModelLoader;
use crate::subsystems::responder::WorkerContext;

/// Sender names attached to display tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLabels {
    pub user: String,
    pub bot: String,
    pub system: String,
}

impl From<&DisplayConfig> for DisplayLabels {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            user: config.user_label.clone(),
            bot: config.bot_label.clone(),
            system: config.system_label.clone(),
        }
    }
}

impl Default for DisplayLabels {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

pub struct ChatPipeline {
    ctx: WorkerContext,
    workers: TaskTracker,
    intake: IntakeSender,
}

impl ChatPipeline {
    /// Must be called from within a Tokio runtime; starts the intake task.
    pub fn new(
        store: ChatStore,
        session_id: SessionId,
        loader: ModelLoader,
        results: ResultSender,
        labels: DisplayLabels,
    ) -> Self {
        let ctx = WorkerContext {
            store,
            session_id,
            loader,
            results,
            labels,
        };
        let workers = TaskTracker::new();
        let intake = intake::spawn_intake(ctx.clone(), workers.clone());

        Self {
            ctx,
            workers,
            intake,
        }
    }

    /// Open the chat log, start a session and kick off the model load.
    ///
    /// Returns as soon as the load is scheduled; readiness is announced
    /// through the returned dispatcher.
    pub async fn bootstrap(config: &ParlorConfig) -> Result<(Self, Dispatcher), ParlorError> {
        let store = ChatStore::open(&config.database.path).await?;
        let meta = SessionMeta::new(&config.service.platform);
        let session_id = store.create_session(&config.service.user_id, &meta).await?;

        let (results, dispatcher) = result_channel();
        let labels = DisplayLabels::from(&config.display);

        if let Some(greeting) = &config.display.greeting {
            results.push(DisplayTuple::bot(&labels.bot, greeting));
        }
        results.push(DisplayTuple::system(&labels.system, "Loading model..."));

        let loader = ModelLoader::new();
        let model_config = config.model.clone();
        loader.spawn_load(
            move || {
                OnnxGenerator::load(&model_config)
                    .map(|generator| Arc::new(generator) as Arc<dyn TextGenerator>)
            },
            results.clone(),
            labels.clone(),
        );

        tracing::info!(session_id = %session_id, "Chat pipeline started");
        Ok((Self::new(store, session_id, loader, results, labels), dispatcher))
    }

    pub fn session_id(&self) -> SessionId {
        self.ctx.session_id
    }

    pub fn store(&self) -> &ChatStore {
        &self.ctx.store
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.ctx.loader
    }

    /// Accept a message from the user and answer it in the background.
    ///
    /// Blank text is rejected before any I/O. The user's own line is echoed
    /// through the result channel ahead of anything the worker produces.
    /// Messages are logged in the order they are submitted.
    pub fn submit_message(&self, text: &str) -> Result<(), ParlorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParlorError::Validation(
                "message text must not be empty".to_string(),
            ));
        }

        self.ctx
            .results
            .push(DisplayTuple::user(&self.ctx.labels.user, text));

        let submission = Submission {
            text: text.to_string(),
            token: self.workers.token(),
        };
        if self.intake.send(submission).is_err() {
            tracing::error!(session_id = %self.ctx.session_id, "Intake task is gone, message dropped");
            self.ctx.results.push(DisplayTuple::system(
                &self.ctx.labels.system,
                format!("Failed to save message: {}", ParlorError::Stopped),
            ));
            return Err(ParlorError::Stopped);
        }

        Ok(())
    }

    /// Number of messages still being logged or answered.
    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    /// Wait until every submitted message has been fully handled.
    pub async fn quiesce(&self) {
        self.workers.close();
        self.workers.wait().await;
        self.workers.reopen();
    }

    /// Stop the pipeline: give in-flight workers up to `grace` to finish,
    /// then close the chat log. Workers still generating after that are
    /// abandoned; their late writes fail and their output is dropped.
    pub async fn shutdown(self, grace: Duration) {
        let Self {
            ctx,
            workers,
            intake,
        } = self;

        // Queued messages are still logged; the intake exits once they are.
        drop(intake);
        workers.close();
        if tokio::time::timeout(grace, workers.wait()).await.is_err() {
            tracing::warn!(
                abandoned = workers.len(),
                "Shutdown grace period elapsed with workers still running"
            );
        }
        ctx.store.close().await;
        tracing::info!(session_id = %ctx.session_id, "Chat pipeline stopped");
    }
}
