mod config;

use crate::config::Config;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use clap::Parser;
use futures::{SinkExt, StreamExt, future};
use realtime_stt::{ConnectionSupervisor, TranscriptionConfig, WebSocketConnector};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use uuid::Uuid;
use voice_core::{
    ChannelTransport, ChatCompletionClient, CompletionProvider, ConversationSession, Providers, SessionOptions,
    SpeechSynthesizer, Synthesizer,
};

/// Outbound messages buffered per connection before senders wait on the socket.
const OUTBOUND_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(version, about = "Real-time voice conversation server")]
struct Cli {
    /// Address to listen on, overriding BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
}

/// Shared by every connection. Provider clients are reused; each connection
/// gets its own transport, session and transcription stream.
#[derive(Clone)]
struct AppState {
    transcription: Arc<TranscriptionConfig>,
    completion: Arc<dyn CompletionProvider>,
    synthesizer: Arc<dyn Synthesizer>,
    options: SessionOptions,
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::debug!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| {
        let id = Uuid::new_v4();
        handle_socket(socket, state).instrument(tracing::info_span!("conversation", %id))
    })
}

/// Runs one conversation for the lifetime of the socket.
async fn handle_socket(socket: WebSocket, state: AppState) {
    tracing::info!("WebSocket connection established");
    let (mut socket_tx, socket_rx) = socket.split();
    let (transport, mut outbound) = ChannelTransport::new(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(
        async move {
            while let Some(text) = outbound.recv().await {
                if let Err(e) = socket_tx.send(Message::Text(text.into())).await {
                    tracing::debug!("client went away: {}", e);
                    break;
                }
            }
            let _ = socket_tx.close().await;
        }
        .in_current_span(),
    );

    let inbound = socket_rx
        .take_while(|frame| future::ready(matches!(frame, Ok(message) if !matches!(message, Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<serde_json::Value>(text.as_str()) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!("ignoring invalid JSON from client: {}", e);
                        None
                    }
                },
                _ => None,
            })
        });

    let providers = Providers {
        transport: Arc::new(transport),
        completion: state.completion.clone(),
        synthesizer: state.synthesizer.clone(),
    };
    let transcription = state.transcription.clone();
    let session = ConversationSession::start(providers, state.options.clone(), move |observer, latch| {
        ConnectionSupervisor::new(transcription, Arc::new(WebSocketConnector), observer).with_interruption(latch)
    });

    if let Err(e) = session.run(inbound).await {
        tracing::error!("conversation ended with error: {:#}", e);
    }

    if let Err(e) = writer.await {
        tracing::error!("writer task failed: {}", e);
    }
    tracing::info!("WebSocket connection closed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;
    let args = Cli::parse();

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    // --- 3. Build Provider Clients ---
    let transcription = config
        .transcription_config()
        .context("Invalid transcription configuration")?;
    let state = AppState {
        transcription: Arc::new(transcription),
        completion: Arc::new(ChatCompletionClient::new(config.completion_config())),
        synthesizer: Arc::new(SpeechSynthesizer::new(config.synthesis_config())),
        options: config.session_options(),
    };
    tracing::info!(interrupt = config.interrupt_agent, "configuration loaded");

    // --- 4. Serve ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/chat", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state);

    let addr = args.bind.unwrap_or(config.bind_address);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
