//! Messages exchanged with the client over the conversation transport.
//!
//! Every record is tagged with a `type` discriminator so the client can route it.

use crate::audio::Base64EncodedAudioBytes;

/// Discriminator values, shared by inbound and outbound records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    AudioInput,
    Interrupt,
    Error,
    UserTranscript,
    TextOutput,
    AudioOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message received from the client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    kind: MessageType,
    content: Base64EncodedAudioBytes,
}

impl InboundMessage {
    pub fn audio(content: &str) -> Self {
        Self {
            kind: MessageType::AudioInput,
            content: content.to_string(),
        }
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> Base64EncodedAudioBytes {
        self.content
    }
}

/// User-visible failure categories reported in `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "TTSConnectionError")]
    SynthesisConnection,
    #[serde(rename = "TTSRuntimeError")]
    SynthesisRuntime,
    #[serde(rename = "CompletionError")]
    Completion,
}

/// A message sent to the client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Echo of the finalized user utterance.
    UserTranscript { role: Role, content: String },
    /// One incremental fragment of the assistant reply.
    TextOutput { role: Role, content: String },
    /// One synthesized audio chunk, base64 encoded.
    AudioOutput { role: Role, content: Base64EncodedAudioBytes },
    /// The user barged in; the client should stop playback.
    Interrupt,
    Error { error: ErrorKind, error_message: String },
}

impl OutboundMessage {
    pub fn user_transcript(content: &str) -> Self {
        Self::UserTranscript {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn text_output(content: &str) -> Self {
        Self::TextOutput {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }

    pub fn audio_output(content: Base64EncodedAudioBytes) -> Self {
        Self::AudioOutput {
            role: Role::Assistant,
            content,
        }
    }

    pub fn error(error: ErrorKind, error_message: &str) -> Self {
        Self::Error {
            error,
            error_message: error_message.to_string(),
        }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Self::UserTranscript { .. } => MessageType::UserTranscript,
            Self::TextOutput { .. } => MessageType::TextOutput,
            Self::AudioOutput { .. } => MessageType::AudioOutput,
            Self::Interrupt => MessageType::Interrupt,
            Self::Error { .. } => MessageType::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_messages_are_tagged() {
        let json = serde_json::to_value(OutboundMessage::user_transcript("hello")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "user_transcript", "role": "user", "content": "hello"}));

        let json = serde_json::to_value(OutboundMessage::text_output("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text_output", "role": "assistant", "content": "hi"}));

        let json = serde_json::to_value(OutboundMessage::Interrupt).unwrap();
        assert_eq!(json, serde_json::json!({"type": "interrupt"}));
    }

    #[test]
    fn error_message_uses_client_facing_names() {
        let msg = OutboundMessage::error(ErrorKind::SynthesisConnection, "Failed to connect to the TTS service");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "TTSConnectionError");
        assert_eq!(json["error_message"], "Failed to connect to the TTS service");
        assert_eq!(msg.kind(), MessageType::Error);
    }

    #[test]
    fn inbound_audio_frame_parses() {
        let msg: InboundMessage =
            serde_json::from_value(serde_json::json!({"type": "audio_input", "content": "UklGRg=="})).unwrap();
        assert_eq!(msg.kind(), MessageType::AudioInput);
        assert_eq!(msg.content(), "UklGRg==");
    }

    #[test]
    fn inbound_frame_without_content_is_rejected() {
        let parsed = serde_json::from_value::<InboundMessage>(serde_json::json!({"type": "audio_input"}));
        assert!(parsed.is_err());
    }
}
