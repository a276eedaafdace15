//! Turn-taking core for real-time voice conversations.
//!
//! Audio flows in through a [`SpeechInput`], finalized transcripts land in a
//! latest-wins [`TranscriptMailbox`], and a single [`TurnCoordinator`] loop turns
//! each one into a streamed, interruptible spoken reply.

pub mod completion;
pub mod coordinator;
pub mod mailbox;
pub mod pipeline;
pub mod retry;
pub mod session;
pub mod signal;
pub mod synthesis;
pub mod text_utils;
pub mod transcription;
pub mod transport;

#[cfg(test)]
mod testing;

pub use completion::{ChatCompletionClient, ChatHistory, CompletionConfig, CompletionProvider, FragmentStream};
pub use coordinator::TurnCoordinator;
pub use mailbox::TranscriptMailbox;
pub use pipeline::{GenerationPipeline, PipelineError, TurnOutcome};
pub use retry::{RetryPolicy, Transient};
pub use session::{ConversationSession, Providers, SessionOptions};
pub use signal::{CancellationLatch, CompletionSignal, SynthesisStatus};
pub use synthesis::{SpeechSynthesizer, SynthesisConfig, SynthesisError, SynthesisSession, SynthesisStream, Synthesizer};
pub use transcription::{SpeechInput, TranscriptionObserver};
pub use transport::{ChannelTransport, Outbox, Transport, TransportError};
