use realtime_voice_types::ConnectionState;
use voice_core::Transient;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SttError {
    /// Invalid endpoint or session parameters. Never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Network or stream failure. Retried while connecting.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The service answered the handshake with a refusal (bad key, bad path).
    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    #[error("supervisor is closed")]
    Closed,

    /// An `error` event sent by the service.
    #[error("server error: {0}")]
    Server(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SttError {
    /// Whether `connect` should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl Transient for SttError {
    fn is_transient(&self) -> bool {
        SttError::is_transient(self)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SttError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match error {
            Error::Url(e) => Self::Configuration(e.to_string()),
            Error::Http(response) if response.status().is_client_error() => {
                Self::Rejected(format!("handshake refused with {}", response.status()))
            }
            other => Self::Connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Error as WsError;
    use tokio_tungstenite::tungstenite::error::UrlError;

    #[test]
    fn only_connection_errors_are_transient() {
        assert!(SttError::Connection("reset".into()).is_transient());
        assert!(!SttError::Rejected("401".into()).is_transient());
        assert!(!SttError::Configuration("ws://".into()).is_transient());
        assert!(!SttError::Closed.is_transient());
    }

    #[test]
    fn maps_websocket_errors() {
        assert!(matches!(SttError::from(WsError::ConnectionClosed), SttError::Connection(_)));
        assert!(matches!(
            SttError::from(WsError::Url(UrlError::NoHostName)),
            SttError::Configuration(_)
        ));
    }
}
