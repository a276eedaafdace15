use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use realtime_voice_types::ConnectionState;
use realtime_voice_types::audio::Base64EncodedAudioBytes;
use std::error::Error as StdError;

/// Receives what the transcription stream produces. Implemented by the
/// conversation session; called from the stream's receive loop.
#[async_trait]
pub trait TranscriptionObserver: Send + Sync {
    /// A finalized, non-empty transcript.
    async fn on_final(&self, transcript: String);

    /// An interim hypothesis for the utterance in progress.
    async fn on_partial(&self, _delta: &str) {}

    /// The user started speaking. When interruption is enabled the turn latch has
    /// already been set by the time this runs.
    async fn on_interruption(&self);

    /// A recoverable error from the stream or the provider.
    async fn on_error(&self, error: &(dyn StdError + Send + Sync)) {
        tracing::error!("transcription error: {}", error);
    }

    async fn on_state_change(&self, _state: ConnectionState) {}
}

/// The inbound audio side of a conversation, as seen by the session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechInput: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Forwards one base64-encoded audio frame.
    async fn send_audio(&mut self, audio: Base64EncodedAudioBytes) -> Result<()>;

    async fn disconnect(&mut self);
}
