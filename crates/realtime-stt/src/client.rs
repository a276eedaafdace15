use crate::client::config::TranscriptionConfig;
use crate::client::connector::{Connector, WsSink, WsStream};
use crate::client::stats::Stats;
use crate::error::SttError;
use futures_util::{SinkExt, StreamExt};
use realtime_voice_types::audio::Base64EncodedAudioBytes;
use realtime_voice_types::events::client::{
    InputAudioBufferAppendEvent, InputAudioBufferClearEvent, TranscriptionSessionUpdateEvent,
};
use realtime_voice_types::{ClientEvent, ConnectionState, ServerEvent};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use voice_core::{CancellationLatch, SpeechInput, TranscriptionObserver};

pub(crate) mod config;
pub(crate) mod connector;
mod consts;
pub(crate) mod stats;
mod utils;

/// Connection state shared by the supervisor and its receive loop. Every change
/// is logged and reported to the observer.
#[derive(Clone)]
struct StateCell {
    state: Arc<Mutex<ConnectionState>>,
    observer: Arc<dyn TranscriptionObserver>,
}

impl StateCell {
    fn new(observer: Arc<dyn TranscriptionObserver>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            observer,
        }
    }

    fn get(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next`. No-op when already there; refused once `Closed`.
    async fn set(&self, next: ConnectionState) -> bool {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == next {
                return false;
            }
            if state.is_terminal() {
                tracing::debug!(to = %next, "ignoring transition out of closed");
                return false;
            }
            std::mem::replace(&mut *state, next)
        };
        tracing::info!(from = %previous, to = %next, "transcription connection state changed");
        self.observer.on_state_change(next).await;
        true
    }
}

/// Owns one transcription stream: connects with retry, configures the session,
/// forwards audio, and runs a receive loop that turns server events into
/// observer calls.
pub struct ConnectionSupervisor {
    config: Arc<TranscriptionConfig>,
    connector: Arc<dyn Connector>,
    observer: Arc<dyn TranscriptionObserver>,
    interruption: Option<CancellationLatch>,
    state: StateCell,
    sink: Option<WsSink>,
    receiver: Option<JoinHandle<()>>,
    stats: Arc<Mutex<Stats>>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: Arc<TranscriptionConfig>,
        connector: Arc<dyn Connector>,
        observer: Arc<dyn TranscriptionObserver>,
    ) -> Self {
        Self {
            config,
            connector,
            state: StateCell::new(observer.clone()),
            observer,
            interruption: None,
            sink: None,
            receiver: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    /// Latch to set when the user starts speaking. Without one, speech-start
    /// events are only logged.
    pub fn with_interruption(mut self, interruption: Option<CancellationLatch>) -> Self {
        self.interruption = interruption;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected && self.sink.is_some()
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Opens the stream, sends the session configuration and starts the receive
    /// loop. Transient failures are retried per the configured policy; when the
    /// policy gives up the state falls back to `Disconnected` and the error is
    /// reported to the observer as well as returned.
    pub async fn connect(&mut self) -> Result<(), SttError> {
        match self.state.get() {
            ConnectionState::Closed => return Err(SttError::Closed),
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::warn!("already connected or connecting");
                return Ok(());
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
        }

        self.state.set(ConnectionState::Connecting).await;

        let connector = self.connector.clone();
        let config = self.config.clone();
        let established = self
            .config
            .retry()
            .run(|attempt| {
                let connector = connector.clone();
                let config = config.clone();
                async move {
                    tracing::debug!(attempt, endpoint = config.endpoint(), "connecting to transcription service");
                    let (mut sink, stream) = connector.connect(&config).await?;
                    let update = ClientEvent::TranscriptionSessionUpdate(TranscriptionSessionUpdateEvent::new(
                        config.session().clone(),
                    ));
                    send_event(&mut sink, &update).await?;
                    tracing::debug!("session configuration sent");
                    Ok::<_, SttError>((sink, stream))
                }
            })
            .await;

        match established {
            Ok((sink, stream)) => {
                if let Some(stale) = self.receiver.take() {
                    stale.abort();
                }
                self.sink = Some(sink);
                self.state.set(ConnectionState::Connected).await;

                let receive = ReceiveLoop {
                    state: self.state.clone(),
                    observer: self.observer.clone(),
                    interruption: self.interruption.clone(),
                    stats: self.stats.clone(),
                };
                self.receiver = Some(tokio::spawn(receive.run(stream)));
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected).await;
                self.observer.on_error(&e).await;
                Err(e)
            }
        }
    }

    /// Appends one audio frame to the provider's input buffer. Empty frames are
    /// ignored.
    pub async fn send_audio(&mut self, audio: Base64EncodedAudioBytes) -> Result<(), SttError> {
        let sink = self.connected_sink()?;
        if audio.is_empty() {
            tracing::debug!("ignoring empty audio frame");
            return Ok(());
        }

        let event = ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent::new(audio));
        let result = send_event(sink, &event).await;
        self.after_send(result).await?;
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).record_audio_frame();
        Ok(())
    }

    /// Discards whatever audio the provider has buffered but not committed.
    pub async fn clear_audio_buffer(&mut self) -> Result<(), SttError> {
        let sink = self.connected_sink()?;
        let event = ClientEvent::InputAudioBufferClear(InputAudioBufferClearEvent::new());
        let result = send_event(sink, &event).await;
        self.after_send(result).await?;
        tracing::debug!("audio buffer cleared");
        Ok(())
    }

    /// Closes the supervisor for good: stops the receive loop and closes the
    /// stream. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        tracing::debug!("disconnecting from transcription service");
        self.state.set(ConnectionState::Closed).await;

        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
            if let Err(e) = receiver.await {
                if !e.is_cancelled() {
                    tracing::error!("receive loop ended abnormally: {}", e);
                }
            }
        }

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!("error closing transcription stream: {}", e);
            }
        }
    }

    fn connected_sink(&mut self) -> Result<&mut WsSink, SttError> {
        let state = self.state.get();
        match self.sink.as_mut() {
            Some(sink) if state == ConnectionState::Connected => Ok(sink),
            _ => Err(SttError::NotConnected(state)),
        }
    }

    /// A send that hits a dead stream drops the connection.
    async fn after_send(&mut self, result: Result<(), SttError>) -> Result<(), SttError> {
        if let Err(e) = &result {
            if e.is_transient() {
                tracing::error!("transcription stream closed while sending: {}", e);
                self.state.set(ConnectionState::Disconnected).await;
            }
        }
        result
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

#[async_trait::async_trait]
impl SpeechInput for ConnectionSupervisor {
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(ConnectionSupervisor::connect(self).await?)
    }

    async fn send_audio(&mut self, audio: Base64EncodedAudioBytes) -> anyhow::Result<()> {
        Ok(ConnectionSupervisor::send_audio(self, audio).await?)
    }

    async fn disconnect(&mut self) {
        ConnectionSupervisor::disconnect(self).await
    }
}

async fn send_event(sink: &mut WsSink, event: &ClientEvent) -> Result<(), SttError> {
    let text = serde_json::to_string(event).map_err(|e| SttError::Protocol(e.to_string()))?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

/// State the spawned receive loop needs from its supervisor.
struct ReceiveLoop {
    state: StateCell,
    observer: Arc<dyn TranscriptionObserver>,
    interruption: Option<CancellationLatch>,
    stats: Arc<Mutex<Stats>>,
}

impl ReceiveLoop {
    async fn run(self, mut stream: WsStream) {
        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
                Err(e) => {
                    tracing::error!("failed to read message: {}", e);
                    self.state.set(ConnectionState::Disconnected).await;
                    let error = SttError::Connection(format!("receive loop failed: {e}"));
                    self.observer.on_error(&error).await;
                    return;
                }
            };

            match message {
                Message::Text(text) => self.handle_text(&text).await,
                Message::Binary(bin) => {
                    tracing::warn!("unexpected binary message: {} bytes", bin.len());
                }
                Message::Close(reason) => {
                    tracing::info!("connection closed: {:?}", reason);
                    break;
                }
                _ => {}
            }
        }

        tracing::debug!("transcription stream ended");
        self.state.set(ConnectionState::Disconnected).await;
    }

    async fn handle_text(&self, text: &str) {
        let json = match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("invalid JSON received: {}", e);
                return;
            }
        };
        tracing::debug!(
            "received message: {}, id={}",
            json.get("type").and_then(|v| v.as_str()).unwrap_or("unknown"),
            json.get("event_id").and_then(|v| v.as_str()).unwrap_or("unknown")
        );

        let event = match serde_json::from_value::<ServerEvent>(json) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("failed to deserialize event: {}", e);
                return;
            }
        };

        match event {
            ServerEvent::InputAudioBufferSpeechStarted(_) => self.on_speech_started().await,
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(completed) => {
                let transcript = completed.transcript();
                if transcript.is_empty() {
                    tracing::debug!("ignoring empty transcript");
                    return;
                }
                tracing::debug!("user transcription: {}", transcript);
                self.stats.lock().unwrap_or_else(PoisonError::into_inner).record_final();
                self.observer.on_final(transcript.to_string()).await;
            }
            ServerEvent::ConversationItemInputAudioTranscriptionDelta(delta) => {
                if !delta.delta().is_empty() {
                    self.observer.on_partial(delta.delta()).await;
                }
            }
            ServerEvent::ConversationItemInputAudioTranscriptionFailed(failed) => {
                let error = SttError::Server(format!("transcription failed: {}", failed.error()));
                self.observer.on_error(&error).await;
            }
            ServerEvent::Error(error) => {
                let error = SttError::Server(error.error().to_string());
                self.observer.on_error(&error).await;
            }
            ServerEvent::TranscriptionSessionCreated(_) | ServerEvent::TranscriptionSessionUpdated(_) => {
                tracing::debug!("transcription session ready");
            }
            _ => {}
        }
    }

    async fn on_speech_started(&self) {
        let Some(latch) = &self.interruption else {
            tracing::debug!("speech started");
            return;
        };
        latch.cancel();
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).record_interruption();
        self.observer.on_interruption().await;
    }
}
