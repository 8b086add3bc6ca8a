//! Responder — the per-message worker
//!
//! Messages reach a worker already logged (see `intake`). Each worker:
//! - checks model readiness (no retry when not ready)
//! - generates a reply and logs it against the message id
//! - reports the reply, or whatever went wrong, as a display tuple
//!
//! Nothing escapes the worker: every failure ends as a system tuple.

use parlor_core::models::{MessageId, ResponseId, TriggerDetails, DEFAULT_TRIGGER_NAME};
use parlor_core::{ChatStore, DisplayTuple, ParlorError, SessionId};

use crate::pipeline::DisplayLabels;
use crate::subsystems::dispatcher::ResultSender;
use crate::subsystems::loader::ModelLoader;

/// Shown when a message arrives before the model is ready.
pub const NOT_READY_NOTICE: &str = "Model is not loaded yet...";

/// Everything a worker needs; cheap to clone per message.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub store: ChatStore,
    pub session_id: SessionId,
    pub loader: ModelLoader,
    pub results: ResultSender,
    pub labels: DisplayLabels,
}

/// How a single message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Answered {
        message_id: MessageId,
        response_id: ResponseId,
    },
    NotReady {
        message_id: MessageId,
    },
    GenerationFailed {
        message_id: MessageId,
    },
    ResponseNotLogged {
        message_id: MessageId,
    },
}

/// Record a submitted message. On failure the user is told and `None` is
/// returned; the message then gets no reply.
pub async fn log_message(ctx: &WorkerContext, text: &str) -> Option<MessageId> {
    match ctx.store.log_user_message(ctx.session_id, text).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(session_id = %ctx.session_id, error = %e, "Failed to log user message");
            ctx.results.push(DisplayTuple::system(
                &ctx.labels.system,
                format!("Failed to save message: {e}"),
            ));
            None
        }
    }
}

/// Answer one logged message. Panics inside generation are caught at the
/// task boundary and reported like any other generation failure.
pub async fn run_worker(
    ctx: WorkerContext,
    message_id: MessageId,
    text: String,
) -> Option<ResponseOutcome> {
    let results = ctx.results.clone();
    let system_label = ctx.labels.system.clone();

    let worker = tokio::spawn(async move { respond(&ctx, message_id, &text).await });
    match worker.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(message_id = %message_id, error = %e, "Response worker aborted");
            results.push(DisplayTuple::system(
                system_label,
                format!("Generation error: {e}"),
            ));
            None
        }
    }
}

/// Generate and record the reply to an already-logged message.
pub async fn respond(ctx: &WorkerContext, message_id: MessageId, text: &str) -> ResponseOutcome {
    let generator = match ctx.loader.handle() {
        Ok(generator) => generator,
        Err(e) => {
            tracing::info!(message_id = %message_id, error = %e, "Message arrived before model was ready");
            ctx.results
                .push(DisplayTuple::system(&ctx.labels.system, NOT_READY_NOTICE));
            return ResponseOutcome::NotReady { message_id };
        }
    };

    let reply = match generator.generate(text).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(message_id = %message_id, model = generator.model_name(), error = %e, "Generation failed");
            ctx.results.push(DisplayTuple::system(
                &ctx.labels.system,
                ParlorError::from(e).to_string(),
            ));
            return ResponseOutcome::GenerationFailed { message_id };
        }
    };

    let details = TriggerDetails::auto(generator.model_name());
    match ctx
        .store
        .log_bot_response(message_id, &reply, DEFAULT_TRIGGER_NAME, &details)
        .await
    {
        Ok(response_id) => {
            tracing::info!(message_id = %message_id, chars = reply.len(), "Reply generated");
            ctx.results.push(DisplayTuple::bot(&ctx.labels.bot, reply));
            ResponseOutcome::Answered {
                message_id,
                response_id,
            }
        }
        Err(e) => {
            tracing::error!(message_id = %message_id, error = %e, "Failed to log bot response");
            ctx.results.push(DisplayTuple::system(
                &ctx.labels.system,
                format!("Failed to save response: {e}"),
            ));
            ResponseOutcome::ResponseNotLogged { message_id }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::dispatcher::{result_channel, Dispatcher};
    use async_trait::async_trait;
    use parlor_core::models::SessionMeta;
    use parlor_core::{Category, GenerationError, TextGenerator};
    use std::sync::Arc;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Inference("out of memory".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl TextGenerator for PanickingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            panic!("malformed handle")
        }

        fn model_name(&self) -> &str {
            "panicking"
        }
    }

    /// Closes the chat log mid-generation, like a shutdown overtaking a slow reply.
    struct ClosingGenerator(ChatStore);

    #[async_trait]
    impl TextGenerator for ClosingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.close().await;
            Ok("too late".to_string())
        }

        fn model_name(&self) -> &str {
            "closing"
        }
    }

    async fn context_with_store(
        store: ChatStore,
        loader: ModelLoader,
    ) -> (WorkerContext, Dispatcher) {
        let session_id = store
            .create_session("default_user", &SessionMeta::new("desktop"))
            .await
            .unwrap();
        let (results, dispatcher) = result_channel();
        let ctx = WorkerContext {
            store,
            session_id,
            loader,
            results,
            labels: DisplayLabels::default(),
        };
        (ctx, dispatcher)
    }

    async fn context(loader: ModelLoader) -> (WorkerContext, Dispatcher) {
        let store = ChatStore::open_in_memory().await.unwrap();
        context_with_store(store, loader).await
    }

    #[tokio::test]
    async fn test_answered_message_is_logged_and_displayed() {
        let loader = ModelLoader::ready_with(Arc::new(FixedGenerator("hi there")));
        let (ctx, mut dispatcher) = context(loader).await;

        let message_id = log_message(&ctx, "hello").await.expect("message logged");
        let outcome = respond(&ctx, message_id, "hello").await;
        assert!(
            matches!(outcome, ResponseOutcome::Answered { message_id: id, .. } if id == message_id),
            "got {outcome:?}"
        );

        let responses = ctx.store.responses_for_message(message_id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].trigger_name, DEFAULT_TRIGGER_NAME);

        let tuples = dispatcher.drain_all();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].category, Category::Bot);
        assert_eq!(tuples[0].sender, ctx.labels.bot);
    }

    #[tokio::test]
    async fn test_not_ready_skips_generation() {
        let (ctx, mut dispatcher) = context(ModelLoader::new()).await;

        let message_id = log_message(&ctx, "too early").await.unwrap();
        let outcome = respond(&ctx, message_id, "too early").await;
        assert_eq!(outcome, ResponseOutcome::NotReady { message_id });

        let counts = ctx.store.row_counts().await.unwrap();
        assert_eq!(counts.user_messages, 1);
        assert_eq!(counts.bot_responses, 0);

        let tuples = dispatcher.drain_all();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].text, NOT_READY_NOTICE);
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_system_tuple() {
        let loader = ModelLoader::ready_with(Arc::new(FailingGenerator));
        let (ctx, mut dispatcher) = context(loader).await;

        let message_id = log_message(&ctx, "hello").await.unwrap();
        let outcome = respond(&ctx, message_id, "hello").await;
        assert_eq!(outcome, ResponseOutcome::GenerationFailed { message_id });
        assert_eq!(ctx.store.row_counts().await.unwrap().bot_responses, 0);

        let tuples = dispatcher.drain_all();
        assert_eq!(tuples.len(), 1);
        assert!(tuples[0].is_system());
        assert!(tuples[0].text.starts_with("Generation error"));
        assert!(tuples[0].text.contains("out of memory"));
    }

    #[tokio::test]
    async fn test_message_log_failure_is_reported() {
        let (ctx, mut dispatcher) = context(ModelLoader::new()).await;
        ctx.store.close().await;

        assert!(log_message(&ctx, "lost").await.is_none());

        let tuples = dispatcher.drain_all();
        assert_eq!(tuples.len(), 1);
        assert!(tuples[0].is_system());
        assert!(tuples[0].text.starts_with("Failed to save message"));
    }

    #[tokio::test]
    async fn test_response_write_after_close_is_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_logs.db");
        let store = ChatStore::open(&path).await.unwrap();
        let loader = ModelLoader::ready_with(Arc::new(ClosingGenerator(store.clone())));
        let (ctx, mut dispatcher) = context_with_store(store, loader).await;

        let message_id = log_message(&ctx, "slow question").await.unwrap();
        let outcome = run_worker(ctx.clone(), message_id, "slow question".to_string()).await;
        assert_eq!(outcome, Some(ResponseOutcome::ResponseNotLogged { message_id }));

        let tuples = dispatcher.drain_all();
        assert_eq!(tuples.len(), 1);
        assert!(tuples[0].is_system());
        assert!(tuples[0].text.starts_with("Failed to save response"));
        assert!(!tuples.iter().any(|t| t.category == Category::Bot));

        let reopened = ChatStore::open(&path).await.unwrap();
        let counts = reopened.row_counts().await.unwrap();
        assert_eq!(counts.user_messages, 1);
        assert_eq!(counts.bot_responses, 0);
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_worker_contains_panics() {
        let loader = ModelLoader::ready_with(Arc::new(PanickingGenerator));
        let (ctx, mut dispatcher) = context(loader).await;

        let message_id = log_message(&ctx, "boom").await.unwrap();
        let outcome = run_worker(ctx.clone(), message_id, "boom".to_string()).await;
        assert!(outcome.is_none());
        assert_eq!(ctx.store.row_counts().await.unwrap().user_messages, 1);

        let tuples = dispatcher.drain_all();
        assert_eq!(tuples.len(), 1);
        assert!(tuples[0].is_system());
        assert!(tuples[0].text.starts_with("Generation error"));
    }
}
