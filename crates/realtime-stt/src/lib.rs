mod client;
mod error;

pub use realtime_voice_types as types;
pub use client::config::{TranscriptionConfig, TranscriptionConfigBuilder};
pub use client::connector::{Connector, WebSocketConnector, WsSink, WsStream};
pub use voice_core::RetryPolicy;
pub use client::stats::Stats;
pub use client::ConnectionSupervisor;
pub use error::SttError;
