use crate::completion::ChatHistory;
use crate::mailbox::TranscriptMailbox;
use crate::pipeline::{GenerationPipeline, TurnOutcome};
use crate::signal::CancellationLatch;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Runs one generation turn per finalized transcript, one at a time, for the
/// lifetime of a conversation.
pub struct TurnCoordinator {
    mailbox: Arc<TranscriptMailbox>,
    interruption: CancellationLatch,
    pipeline: GenerationPipeline,
    history: ChatHistory,
}

impl TurnCoordinator {
    pub fn new(mailbox: Arc<TranscriptMailbox>, interruption: CancellationLatch, pipeline: GenerationPipeline) -> Self {
        Self {
            mailbox,
            interruption,
            pipeline,
            history: ChatHistory::new(),
        }
    }

    /// Starts the turn loop on its own task. The caller owns the handle and is
    /// responsible for aborting it on teardown.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        loop {
            self.next_turn().await;
        }
    }

    /// Waits for a transcript and runs a turn for it. Returns `None` when the
    /// transcript was empty or the turn failed; failures are logged here and do
    /// not stop the loop.
    pub async fn next_turn(&mut self) -> Option<TurnOutcome> {
        self.mailbox.await_ready().await;
        let transcript = self.mailbox.take_and_clear()?;
        if transcript.trim().is_empty() {
            tracing::debug!("ignoring empty transcript");
            return None;
        }

        // A new turn never inherits the previous turn's interruption.
        self.interruption.reset();
        tracing::info!(chars = transcript.len(), "starting turn");

        match self.pipeline.run(&mut self.history, &transcript).await {
            Ok(outcome) => {
                tracing::info!(?outcome, "turn finished");
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("turn failed: {}", e);
                None
            }
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }
}
