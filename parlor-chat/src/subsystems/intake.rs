//! Intake — logs submitted messages one at a time, in submission order
//!
//! `submit_message` never waits on the database. It queues the text here and
//! a single task logs each message before handing it to its own responder
//! worker. Message ids and `sent_at` follow submission order even when
//! replies finish out of order.

use parlor_core::MessageId;
use tokio::sync::mpsc;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;

use crate::subsystems::responder::{self, WorkerContext};

/// A message waiting to be logged. The token keeps the pipeline's tracker
/// busy until the message has been handed to its responder.
#[derive(Debug)]
pub struct Submission {
    pub text: String,
    pub token: TaskTrackerToken,
}

pub type IntakeSender = mpsc::UnboundedSender<Submission>;

/// Start the intake task. It runs until every sender is dropped and the
/// queue is empty. Must be called from within a Tokio runtime.
pub fn spawn_intake(ctx: WorkerContext, workers: TaskTracker) -> IntakeSender {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_intake(ctx, workers, rx));
    tx
}

async fn run_intake(
    ctx: WorkerContext,
    workers: TaskTracker,
    mut rx: mpsc::UnboundedReceiver<Submission>,
) {
    while let Some(Submission { text, token }) = rx.recv().await {
        if let Some(message_id) = responder::log_message(&ctx, &text).await {
            dispatch(&ctx, &workers, message_id, text);
        }
        drop(token);
    }
    tracing::debug!(session_id = %ctx.session_id, "Intake closed");
}

fn dispatch(ctx: &WorkerContext, workers: &TaskTracker, message_id: MessageId, text: String) {
    tracing::debug!(message_id = %message_id, "Message logged, spawning responder");
    workers.spawn(responder::run_worker(ctx.clone(), message_id, text));
}

// ============================================================================
// TESTS
// ============================================================================
