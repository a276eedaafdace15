//! One client connection's voice conversation.

use crate::completion::CompletionProvider;
use crate::coordinator::TurnCoordinator;
use crate::mailbox::TranscriptMailbox;
use crate::pipeline::GenerationPipeline;
use crate::signal::CancellationLatch;
use crate::synthesis::Synthesizer;
use crate::transcription::{SpeechInput, TranscriptionObserver};
use crate::transport::{Outbox, Transport};
use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use realtime_voice_types::{ConnectionState, InboundMessage, MessageType, OutboundMessage};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Let user speech cut off an in-flight reply.
    pub interrupt_enabled: bool,
}

/// External services a conversation talks to.
#[derive(Clone)]
pub struct Providers {
    pub transport: Arc<dyn Transport>,
    pub completion: Arc<dyn CompletionProvider>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Routes transcription events into the conversation.
struct SessionEvents {
    mailbox: Arc<TranscriptMailbox>,
    outbox: Outbox,
}

#[async_trait]
impl TranscriptionObserver for SessionEvents {
    async fn on_final(&self, transcript: String) {
        tracing::debug!(chars = transcript.len(), "final transcript");
        if let Some(displaced) = self.mailbox.publish(transcript) {
            tracing::debug!(chars = displaced.len(), "replaced unconsumed transcript");
        }
    }

    async fn on_interruption(&self) {
        tracing::info!("user interrupted");
        if let Err(e) = self.outbox.send(&OutboundMessage::Interrupt).await {
            tracing::error!("failed to send interrupt notice: {}", e);
        }
    }

    async fn on_state_change(&self, state: ConnectionState) {
        tracing::debug!(%state, "transcription state changed");
    }
}

/// Owns the turn latch, the transcript mailbox, the turn loop and the speech
/// input for one connection.
///
/// The turn loop starts with the session. [`ConversationSession::run`] feeds
/// inbound audio until the client goes away and then tears everything down.
pub struct ConversationSession<S: SpeechInput> {
    input: S,
    interruption: CancellationLatch,
    mailbox: Arc<TranscriptMailbox>,
    turns: Option<JoinHandle<()>>,
}

impl<S: SpeechInput> ConversationSession<S> {
    /// Creates the session and starts its turn loop.
    ///
    /// `make_input` receives the observer the speech input must report to and,
    /// when interruption is enabled, the latch it should set on speech start.
    pub fn start<F>(providers: Providers, options: SessionOptions, make_input: F) -> Self
    where
        F: FnOnce(Arc<dyn TranscriptionObserver>, Option<CancellationLatch>) -> S,
    {
        let interruption = CancellationLatch::new();
        let mailbox = Arc::new(TranscriptMailbox::new());
        let outbox = Outbox::new(providers.transport);

        let observer: Arc<dyn TranscriptionObserver> = Arc::new(SessionEvents {
            mailbox: mailbox.clone(),
            outbox: outbox.clone(),
        });
        let input = make_input(observer, options.interrupt_enabled.then(|| interruption.clone()));

        let pipeline = GenerationPipeline::new(
            outbox,
            providers.completion,
            providers.synthesizer,
            interruption.clone(),
        );
        let turns = TurnCoordinator::new(mailbox.clone(), interruption.clone(), pipeline).spawn();
        tracing::info!(interrupt = options.interrupt_enabled, "conversation started");

        Self {
            input,
            interruption,
            mailbox,
            turns: Some(turns),
        }
    }

    /// Connects the speech input and forwards every inbound audio message until
    /// `inbound` ends. Bad messages and forwarding errors are logged and skipped.
    /// The session is torn down on return, whether or not the connection succeeded.
    pub async fn run<M>(mut self, inbound: M) -> Result<()>
    where
        M: Stream<Item = serde_json::Value> + Send,
    {
        if let Err(e) = self.input.connect().await {
            tracing::error!("failed to connect speech input: {:#}", e);
            self.shutdown().await;
            return Err(e);
        }

        let mut inbound = std::pin::pin!(inbound);
        while let Some(message) = inbound.next().await {
            self.ingest(message).await;
        }

        tracing::info!("client stream ended");
        self.shutdown().await;
        Ok(())
    }

    async fn ingest(&mut self, message: serde_json::Value) {
        let message = match serde_json::from_value::<InboundMessage>(message) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("invalid inbound message: {}", e);
                return;
            }
        };
        if message.kind() != MessageType::AudioInput {
            tracing::warn!(kind = ?message.kind(), "ignoring non-audio message");
            return;
        }
        if let Err(e) = self.input.send_audio(message.into_content()).await {
            tracing::error!("failed to forward audio: {:#}", e);
        }
    }

    /// Disconnects the speech input, then aborts and joins the turn loop.
    pub async fn shutdown(&mut self) {
        self.input.disconnect().await;
        if let Some(turns) = self.turns.take() {
            turns.abort();
            if let Err(e) = turns.await {
                if !e.is_cancelled() {
                    tracing::error!("turn loop ended abnormally: {}", e);
                }
            }
        }
        tracing::info!("conversation closed");
    }

    pub fn interruption(&self) -> &CancellationLatch {
        &self.interruption
    }

    pub fn mailbox(&self) -> &Arc<TranscriptMailbox> {
        &self.mailbox
    }

    pub fn is_running(&self) -> bool {
        self.turns.as_ref().is_some_and(|turns| !turns.is_finished())
    }
}

impl<S: SpeechInput> Drop for ConversationSession<S> {
    fn drop(&mut self) {
        if let Some(turns) = self.turns.take() {
            turns.abort();
        }
    }
}
