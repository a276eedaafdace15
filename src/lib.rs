//! Real-time voice conversations: streamed transcription in, a generated and
//! synthesized reply out, with barge-in.
//!
//! This crate bundles the workspace crates behind one dependency:
//! [`stt`] for the transcription stream, [`conversation`] for turn-taking and the
//! provider adapters, and [`types`] for the wire formats.

pub use realtime_stt as stt;
pub use realtime_voice_types as types;
pub use voice_core as conversation;

pub use realtime_stt::{ConnectionSupervisor, TranscriptionConfig, WebSocketConnector};
pub use voice_core::{ConversationSession, Providers, SessionOptions};
