use crate::audio::Base64EncodedAudioBytes;
use crate::session::TranscriptionSession;

/// `transcription_session.update` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptionSessionUpdateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The session configuration to apply
    session: TranscriptionSession,
}

impl TranscriptionSessionUpdateEvent {
    pub fn new(session: TranscriptionSession) -> Self {
        Self {
            event_id: None,
            session,
        }
    }
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn session(&self) -> &TranscriptionSession {
        &self.session
    }
}

/// `input_audio_buffer.append` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferAppendEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The audio data to append to the buffer
    audio: Base64EncodedAudioBytes,
}

impl InputAudioBufferAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self {
            event_id: None,
            audio,
        }
    }
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn audio(&self) -> &Base64EncodedAudioBytes {
        &self.audio
    }
}

/// `input_audio_buffer.clear` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferClearEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

impl InputAudioBufferClearEvent {
    pub fn new() -> Self {
        Self { event_id: None }
    }
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }
}
