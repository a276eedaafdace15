//! One turn of reply generation: completion fragments flow into synthesis and
//! out to the client as text, synthesized audio is relayed as it arrives, and
//! the whole thing stops early when the user interrupts.

use crate::completion::{ChatHistory, CompletionProvider};
use crate::signal::{CancellationLatch, SynthesisStatus};
use crate::synthesis::{AudioChunks, SynthesisError, SynthesisSession, SynthesisStream, Synthesizer};
use crate::transport::{Outbox, TransportError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;
use realtime_voice_types::{ErrorKind, OutboundMessage, Role};
use std::sync::Arc;
use tokio::task::JoinHandle;

const SYNTHESIS_CONNECTION_MESSAGE: &str = "Failed to connect to the TTS service";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("completion failed: {0:#}")]
    Completion(anyhow::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// How a turn ended. Synthesis failures are reported to the client and end the
/// turn normally; they never surface as a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Interrupted,
    SynthesisFailed,
}

enum TurnFailure {
    Completion(anyhow::Error),
    Synthesis(SynthesisError),
    Transport(TransportError),
}

pub struct GenerationPipeline {
    outbox: Outbox,
    completion: Arc<dyn CompletionProvider>,
    synthesizer: Arc<dyn Synthesizer>,
    interruption: CancellationLatch,
}

impl GenerationPipeline {
    pub fn new(
        outbox: Outbox,
        completion: Arc<dyn CompletionProvider>,
        synthesizer: Arc<dyn Synthesizer>,
        interruption: CancellationLatch,
    ) -> Self {
        Self {
            outbox,
            completion,
            synthesizer,
            interruption,
        }
    }

    /// Runs one turn for `transcript`. The user text and whatever part of the
    /// reply was actually relayed are appended to `history`.
    pub async fn run(&self, history: &mut ChatHistory, transcript: &str) -> Result<TurnOutcome, PipelineError> {
        self.outbox.send(&OutboundMessage::user_transcript(transcript)).await?;

        let SynthesisStream { mut session, audio } = match self.synthesizer.open(self.interruption.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.report_synthesis_failure(&e).await?;
                return Ok(TurnOutcome::SynthesisFailed);
            }
        };
        let relay = tokio::spawn(relay_audio(audio, self.outbox.clone(), self.interruption.clone()));

        let mut reply = String::new();
        let forwarded = self
            .forward_fragments(history, transcript, &mut *session, &mut reply)
            .await;
        let result = match forwarded {
            Ok(()) => self.finish(session, relay).await,
            Err(failure) => {
                relay.abort();
                Err(failure)
            }
        };

        history.push(Role::User, transcript);
        if !reply.is_empty() {
            history.push(Role::Assistant, reply);
        }

        match result {
            Ok(outcome) => Ok(outcome),
            Err(TurnFailure::Synthesis(e)) => {
                self.report_synthesis_failure(&e).await?;
                Ok(TurnOutcome::SynthesisFailed)
            }
            Err(TurnFailure::Completion(e)) => {
                tracing::error!("completion failed: {:#}", e);
                let message = OutboundMessage::error(ErrorKind::Completion, &format!("{e:#}"));
                self.outbox.send(&message).await?;
                Err(PipelineError::Completion(e))
            }
            Err(TurnFailure::Transport(e)) => Err(e.into()),
        }
    }

    /// Pulls fragments in order, forwarding each to synthesis and to the client.
    /// The latch is checked before every pull, so nothing past the interruption
    /// point is requested from the provider.
    async fn forward_fragments(
        &self,
        history: &ChatHistory,
        transcript: &str,
        session: &mut dyn SynthesisSession,
        reply: &mut String,
    ) -> Result<(), TurnFailure> {
        let mut fragments = self
            .completion
            .stream_reply(history, transcript)
            .await
            .map_err(TurnFailure::Completion)?;

        loop {
            if self.interruption.is_cancelled() {
                tracing::debug!("turn interrupted, abandoning completion stream");
                break;
            }
            let Some(fragment) = fragments.next().await else {
                break;
            };
            let fragment = fragment.map_err(TurnFailure::Completion)?;
            if self.interruption.is_cancelled() {
                tracing::debug!("dropping fragment produced after interruption");
                break;
            }

            session.write_text(&fragment).await.map_err(TurnFailure::Synthesis)?;
            self.outbox
                .send(&OutboundMessage::text_output(&fragment))
                .await
                .map_err(TurnFailure::Transport)?;
            reply.push_str(&fragment);
        }
        Ok(())
    }

    /// Finalizes synthesis and waits until it drains or the user interrupts.
    async fn finish(
        &self,
        mut session: Box<dyn SynthesisSession>,
        relay: JoinHandle<()>,
    ) -> Result<TurnOutcome, TurnFailure> {
        if let Err(e) = session.finalize().await {
            relay.abort();
            return Err(TurnFailure::Synthesis(e));
        }

        let completion = session.completion();
        let status = tokio::select! {
            biased;
            _ = self.interruption.wait() => None,
            status = completion.wait() => Some(status),
        };

        match status {
            Some(SynthesisStatus::Completed) if !self.interruption.is_cancelled() => {
                if let Err(e) = relay.await {
                    tracing::error!("audio relay task failed: {}", e);
                }
                tracing::debug!("turn completed");
                Ok(TurnOutcome::Completed)
            }
            Some(SynthesisStatus::Canceled(reason)) if !self.interruption.is_cancelled() => {
                relay.abort();
                Err(TurnFailure::Synthesis(SynthesisError::Runtime(reason)))
            }
            Some(SynthesisStatus::Unreachable(reason)) if !self.interruption.is_cancelled() => {
                relay.abort();
                Err(TurnFailure::Synthesis(SynthesisError::Connection(reason)))
            }
            _ => {
                relay.abort();
                tracing::debug!("turn interrupted");
                Ok(TurnOutcome::Interrupted)
            }
        }
    }

    async fn report_synthesis_failure(&self, error: &SynthesisError) -> Result<(), TransportError> {
        tracing::error!("synthesis failed: {}", error);
        let message = match error {
            SynthesisError::Connection(_) => {
                OutboundMessage::error(ErrorKind::SynthesisConnection, SYNTHESIS_CONNECTION_MESSAGE)
            }
            SynthesisError::Runtime(reason) => OutboundMessage::error(
                ErrorKind::SynthesisRuntime,
                &format!("Unexpected error in TTS processing: {reason}"),
            ),
        };
        self.outbox.send(&message).await
    }
}

/// Forwards synthesized audio to the client in synthesis order until the
/// channel closes or the turn is interrupted.
async fn relay_audio(mut audio: AudioChunks, outbox: Outbox, interruption: CancellationLatch) {
    while let Some(chunk) = audio.recv().await {
        if interruption.is_cancelled() {
            break;
        }
        let message = OutboundMessage::audio_output(BASE64.encode(&chunk));
        if let Err(e) = outbox.send(&message).await {
            tracing::error!("failed to relay audio chunk: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionProvider;
    use crate::retry::RetryPolicy;
    use crate::synthesis::{SpeechSynthesizer, SynthesisConfig};
    use crate::testing::{FakeSynthesizer, RecordingTransport, ScriptedCompletion};
    use realtime_voice_types::MessageType;
    use std::time::Duration;

    fn pipeline(
        transport: &RecordingTransport,
        completion: &ScriptedCompletion,
        synthesizer: &FakeSynthesizer,
        latch: &CancellationLatch,
    ) -> GenerationPipeline {
        GenerationPipeline::new(
            Outbox::new(Arc::new(transport.clone())),
            Arc::new(completion.clone()),
            Arc::new(synthesizer.clone()),
            latch.clone(),
        )
    }

    #[tokio::test]
    async fn completed_turn_relays_text_and_audio() {
        // --- Arrange ---
        let transport = RecordingTransport::default();
        let completion = ScriptedCompletion::new(&["Hello", " there"]);
        let synthesizer = FakeSynthesizer::default();
        let latch = CancellationLatch::new();
        let mut history = ChatHistory::new();

        // --- Act ---
        let outcome = pipeline(&transport, &completion, &synthesizer, &latch)
            .run(&mut history, "hi")
            .await
            .unwrap();

        // --- Assert ---
        assert_eq!(outcome, TurnOutcome::Completed);
        let sent = transport.sent();
        assert_eq!(sent[0], OutboundMessage::user_transcript("hi"));
        assert_eq!(transport.text_outputs(), vec!["Hello", " there"]);
        let audio: Vec<_> = sent.iter().filter(|m| m.kind() == MessageType::AudioOutput).collect();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0], &OutboundMessage::audio_output(BASE64.encode("Hello")));
        assert_eq!(synthesizer.written(), vec!["Hello", " there"]);
        assert_eq!(history.messages()[1].content, "Hello there");
    }

    #[tokio::test]
    async fn interruption_truncates_at_fragment_boundary() {
        // --- Arrange ---
        let latch = CancellationLatch::new();
        let transport = {
            let latch = latch.clone();
            RecordingTransport::with_hook(move |message| {
                if *message == OutboundMessage::text_output("b") {
                    latch.cancel();
                }
            })
        };
        let completion = ScriptedCompletion::new(&["a", "b", "c", "d"]);
        let synthesizer = FakeSynthesizer::default();
        let mut history = ChatHistory::new();

        // --- Act ---
        let outcome = pipeline(&transport, &completion, &synthesizer, &latch)
            .run(&mut history, "go")
            .await
            .unwrap();

        // --- Assert ---
        assert_eq!(outcome, TurnOutcome::Interrupted);
        assert_eq!(transport.text_outputs(), vec!["a", "b"]);
        assert_eq!(synthesizer.written(), vec!["a", "b"]);
        assert_eq!(completion.pulled(), vec!["a", "b"]);
        assert_eq!(history.messages()[1].content, "ab");
    }

    #[tokio::test]
    async fn synthesis_connect_failure_is_reported_not_raised() {
        let transport = RecordingTransport::default();
        let completion = ScriptedCompletion::new(&["never"]);
        let synthesizer = FakeSynthesizer::failing_to_open(SynthesisError::Connection("refused".into()));
        let mut history = ChatHistory::new();

        let outcome = pipeline(&transport, &completion, &synthesizer, &CancellationLatch::new())
            .run(&mut history, "hi")
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::SynthesisFailed);
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundMessage::error(
                ErrorKind::SynthesisConnection,
                "Failed to connect to the TTS service"
            ))
        );
        assert!(completion.requests().is_empty());
    }

    #[tokio::test]
    async fn synthesis_cancellation_is_a_runtime_error() {
        let transport = RecordingTransport::default();
        let completion = ScriptedCompletion::new(&["Hello"]);
        let synthesizer = FakeSynthesizer::canceling_with("voice unavailable");
        let mut history = ChatHistory::new();

        let outcome = pipeline(&transport, &completion, &synthesizer, &CancellationLatch::new())
            .run(&mut history, "hi")
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::SynthesisFailed);
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundMessage::error(
                ErrorKind::SynthesisRuntime,
                "Unexpected error in TTS processing: voice unavailable"
            ))
        );
    }

    #[tokio::test]
    async fn unreachable_synthesis_is_a_connection_error() {
        let transport = RecordingTransport::default();
        let completion = ScriptedCompletion::new(&["Hello"]);
        let synthesizer = FakeSynthesizer::unreachable_with("connection refused");
        let mut history = ChatHistory::new();

        let outcome = pipeline(&transport, &completion, &synthesizer, &CancellationLatch::new())
            .run(&mut history, "hi")
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::SynthesisFailed);
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundMessage::error(
                ErrorKind::SynthesisConnection,
                "Failed to connect to the TTS service"
            ))
        );
    }

    #[tokio::test]
    async fn speech_service_down_reports_tts_connection_error() {
        // --- Arrange ---
        let transport = RecordingTransport::default();
        let completion = ScriptedCompletion::new(&["Hello there.", " How are you?"]);
        let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1));
        let config = SynthesisConfig::new("http://127.0.0.1:9/v1/audio/speech", "key", "tts-1", "alloy")
            .with_retry_policy(retry);
        let pipeline = GenerationPipeline::new(
            Outbox::new(Arc::new(transport.clone())),
            Arc::new(completion),
            Arc::new(SpeechSynthesizer::new(config)),
            CancellationLatch::new(),
        );
        let mut history = ChatHistory::new();

        // --- Act ---
        let outcome = pipeline.run(&mut history, "hi").await.unwrap();

        // --- Assert ---
        assert_eq!(outcome, TurnOutcome::SynthesisFailed);
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundMessage::error(
                ErrorKind::SynthesisConnection,
                "Failed to connect to the TTS service"
            ))
        );
    }

    #[tokio::test]
    async fn rejected_completion_request_sends_no_text() {
        // --- Arrange ---
        let mut completion = MockCompletionProvider::new();
        completion
            .expect_stream_reply()
            .withf(|history, text| history.is_empty() && text == "hi")
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("401 Unauthorized")));
        let transport = RecordingTransport::default();
        let synthesizer = FakeSynthesizer::default();
        let pipeline = GenerationPipeline::new(
            Outbox::new(Arc::new(transport.clone())),
            Arc::new(completion),
            Arc::new(synthesizer.clone()),
            CancellationLatch::new(),
        );
        let mut history = ChatHistory::new();

        // --- Act ---
        let result = pipeline.run(&mut history, "hi").await;

        // --- Assert ---
        assert!(matches!(result, Err(PipelineError::Completion(_))));
        assert!(transport.text_outputs().is_empty());
        assert!(synthesizer.written().is_empty());
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundMessage::error(ErrorKind::Completion, "401 Unauthorized"))
        );
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn completion_failure_is_reported_and_returned() {
        let transport = RecordingTransport::default();
        let completion = ScriptedCompletion::failing_after(&["Hel"], "upstream reset");
        let synthesizer = FakeSynthesizer::default();
        let mut history = ChatHistory::new();

        let result = pipeline(&transport, &completion, &synthesizer, &CancellationLatch::new())
            .run(&mut history, "hi")
            .await;

        assert!(matches!(result, Err(PipelineError::Completion(_))));
        assert_eq!(
            transport.sent().last(),
            Some(&OutboundMessage::error(ErrorKind::Completion, "upstream reset"))
        );
        assert_eq!(transport.text_outputs(), vec!["Hel"]);
        assert_eq!(history.len(), 2);
    }
}
