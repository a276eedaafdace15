use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use realtime_voice_types::OutboundMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound half of the client connection.
///
/// Delivery is best effort and ordered per caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: String) -> Result<(), TransportError>;
}

/// Encodes [`OutboundMessage`]s and hands them to a [`Transport`].
#[derive(Clone)]
pub struct Outbox {
    transport: Arc<dyn Transport>,
}

impl Outbox {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(message)?;
        tracing::debug!(kind = ?message.kind(), "sending message");
        self.transport.send(text).await
    }
}

/// [`Transport`] backed by a bounded channel. A writer task on the other end
/// forwards messages to the socket.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: String) -> Result<(), TransportError> {
        self.tx.send(message).await.map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn outbox_serializes_before_sending() {
        // --- Arrange ---
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .with(eq(r#"{"type":"interrupt"}"#.to_string()))
            .times(1)
            .returning(|_| Ok(()));
        let outbox = Outbox::new(Arc::new(transport));

        // --- Act ---
        let result = outbox.send(&OutboundMessage::Interrupt).await;

        // --- Assert ---
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn channel_transport_reports_closed_receiver() {
        let (transport, rx) = ChannelTransport::new(1);
        drop(rx);

        let result = transport.send("hello".to_string()).await;

        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
