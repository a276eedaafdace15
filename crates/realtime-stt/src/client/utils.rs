use crate::client::config::TranscriptionConfig;
use crate::client::consts::API_KEY_HEADER;
use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

/// WebSocket handshake request for the configured endpoint, authenticated with
/// the `api-key` header.
pub fn build_request(config: &TranscriptionConfig) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = config.endpoint().into_client_request()?;
    request
        .headers_mut()
        .insert(API_KEY_HEADER, config.api_key().expose_secret().parse()?);
    Ok(request)
}
