mod error;

pub use error::{ErrorDetails, ErrorEvent};

// The transcription endpoint omits ids on some events, so every identifier is optional.

/// `transcription_session.created` / `transcription_session.updated` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptionSessionEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    session: Option<serde_json::Value>,
}

impl TranscriptionSessionEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn session(&self) -> Option<&serde_json::Value> {
        self.session.as_ref()
    }
}

/// `input_audio_buffer.committed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferCommittedEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    previous_item_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
}

impl InputAudioBufferCommittedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn previous_item_id(&self) -> Option<&str> {
        self.previous_item_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferSpeechStartedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Milliseconds since the session started when speech was detected
    #[serde(default)]
    audio_start_ms: Option<i64>,
    /// The ID of the user message item that will be created when speech stops
    #[serde(default)]
    item_id: Option<String>,
}

impl InputAudioBufferSpeechStartedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_start_ms(&self) -> Option<i64> {
        self.audio_start_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `input_audio_buffer.speech_stopped` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferSpeechStoppedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Milliseconds since the session started when speech stopped
    #[serde(default)]
    audio_end_ms: Option<i64>,
    #[serde(default)]
    item_id: Option<String>,
}

impl InputAudioBufferSpeechStoppedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_end_ms(&self) -> Option<i64> {
        self.audio_end_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `conversation.item.input_audio_transcription.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemInputAudioTranscriptionDeltaEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    content_index: Option<i32>,

    /// Partial transcript, not stable
    #[serde(default)]
    delta: String,
}

impl ConversationItemInputAudioTranscriptionDeltaEvent {
    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn content_index(&self) -> Option<i32> {
        self.content_index
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `conversation.item.input_audio_transcription.completed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemInputAudioTranscriptionCompletedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// The ID of the user message item
    #[serde(default)]
    item_id: Option<String>,

    /// The index of the content part containing the audio
    #[serde(default)]
    content_index: Option<i32>,

    /// The transcribed text
    #[serde(default)]
    transcript: String,
}

impl ConversationItemInputAudioTranscriptionCompletedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn content_index(&self) -> Option<i32> {
        self.content_index
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `conversation.item.input_audio_transcription.failed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemInputAudioTranscriptionFailedEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    content_index: Option<i32>,
    error: ErrorDetails,
}

impl ConversationItemInputAudioTranscriptionFailedEvent {
    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}
