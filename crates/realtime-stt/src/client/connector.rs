use crate::client::config::TranscriptionConfig;
use crate::client::utils;
use crate::error::SttError;
use async_trait::async_trait;
use futures::{Sink, Stream};
use futures_util::StreamExt;
use std::pin::Pin;
use tokio_tungstenite::tungstenite::{self, Message};

/// Write half of a transcription stream.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
/// Read half of a transcription stream.
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// Opens the underlying stream. One call is one connection attempt; retrying is
/// the supervisor's job.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &TranscriptionConfig) -> Result<(WsSink, WsStream), SttError>;
}

/// Connects over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &TranscriptionConfig) -> Result<(WsSink, WsStream), SttError> {
        let request = utils::build_request(config)?;
        let (ws_stream, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");

        let (write, read) = ws_stream.split();
        Ok((Box::pin(write), Box::pin(read)))
    }
}
