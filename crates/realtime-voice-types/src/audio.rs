mod transcription;
mod turn_detection;

pub use transcription::InputAudioTranscription;
pub use turn_detection::{ServerVadTurnDetection, TurnDetection, TurnDetectionError};

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Input audio format understood by the transcription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    #[default]
    #[serde(rename = "pcm16")]
    Pcm16,
}
