use crate::audio::{AudioFormat, InputAudioTranscription, TurnDetection};

/// Configuration of a streaming transcription session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptionSession {
    /// The format of input audio. Only "pcm16" is supported.
    input_audio_format: AudioFormat,

    /// Transcription model and biasing prompt
    input_audio_transcription: InputAudioTranscription,

    /// Server-side voice activity detection
    turn_detection: TurnDetection,
}

impl Default for TranscriptionSession {
    fn default() -> Self {
        Self {
            input_audio_format: AudioFormat::Pcm16,
            input_audio_transcription: InputAudioTranscription::default(),
            turn_detection: TurnDetection::default(),
        }
    }
}

impl TranscriptionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_audio_transcription(mut self, transcription: InputAudioTranscription) -> Self {
        self.input_audio_transcription = transcription;
        self
    }

    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.turn_detection = turn_detection;
        self
    }

    pub fn input_audio_format(&self) -> AudioFormat {
        self.input_audio_format
    }

    pub fn input_audio_transcription(&self) -> &InputAudioTranscription {
        &self.input_audio_transcription
    }

    pub fn turn_detection(&self) -> &TurnDetection {
        &self.turn_detection
    }
}
