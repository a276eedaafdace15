use crate::client::consts::{DEFAULT_MODEL, SECURE_SCHEME};
use crate::error::SttError;
use realtime_voice_types::audio::{InputAudioTranscription, ServerVadTurnDetection, TurnDetection};
use realtime_voice_types::session::TranscriptionSession;
use secrecy::SecretString;
use voice_core::RetryPolicy;

/// Everything needed to open and configure a transcription stream.
#[derive(Debug)]
pub struct TranscriptionConfig {
    endpoint: String,
    api_key: SecretString,
    session: TranscriptionSession,
    retry: RetryPolicy,
}

pub struct TranscriptionConfigBuilder {
    endpoint: String,
    api_key: SecretString,
    model: String,
    prompt: String,
    turn_detection: ServerVadTurnDetection,
    retry: RetryPolicy,
}

impl TranscriptionConfigBuilder {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: SecretString::from(String::new()),
            model: DEFAULT_MODEL.to_string(),
            prompt: String::new(),
            turn_detection: ServerVadTurnDetection::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.turn_detection = self.turn_detection.with_threshold(threshold);
        self
    }

    pub fn with_prefix_padding_ms(mut self, prefix_padding_ms: u32) -> Self {
        self.turn_detection = self.turn_detection.with_prefix_padding_ms(prefix_padding_ms);
        self
    }

    pub fn with_silence_duration_ms(mut self, silence_duration_ms: u32) -> Self {
        self.turn_detection = self.turn_detection.with_silence_duration_ms(silence_duration_ms);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates the endpoint scheme and the VAD parameters.
    pub fn build(self) -> Result<TranscriptionConfig, SttError> {
        if !self.endpoint.starts_with(SECURE_SCHEME) {
            return Err(SttError::Configuration(format!(
                "endpoint must be a secure websocket url, got {}",
                self.endpoint
            )));
        }
        let turn_detection = TurnDetection::ServerVad(self.turn_detection);
        turn_detection
            .validate()
            .map_err(|e| SttError::Configuration(e.to_string()))?;

        let session = TranscriptionSession::new()
            .with_input_audio_transcription(InputAudioTranscription::new(&self.model).with_prompt(&self.prompt))
            .with_turn_detection(turn_detection);

        Ok(TranscriptionConfig {
            endpoint: self.endpoint,
            api_key: self.api_key,
            session,
            retry: self.retry,
        })
    }
}

impl TranscriptionConfig {
    pub fn builder(endpoint: &str) -> TranscriptionConfigBuilder {
        TranscriptionConfigBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Session configuration sent right after the stream opens.
    pub fn session(&self) -> &TranscriptionSession {
        &self.session
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}
