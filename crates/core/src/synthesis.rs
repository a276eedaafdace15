//! Cancellable streaming speech synthesis.
//!
//! A [`Synthesizer`] opens one [`SynthesisSession`] per turn. Text is written
//! incrementally, audio comes back on its own channel, and the end of the call
//! is reported out of band on a [`CompletionSignal`].

use crate::retry::{RetryPolicy, Transient};
use crate::signal::{CancellationLatch, CompletionSignal, SynthesisStatus};
use crate::text_utils::{clean_text, take_sentence};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the per-call audio channel.
const AUDIO_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    /// The synthesis service could not be reached or refused the session.
    #[error("synthesis connection failed: {0}")]
    Connection(String),
    /// The session failed after it was established.
    #[error("{0}")]
    Runtime(String),
}

/// Audio chunks in synthesis order. The channel closes when synthesis ends.
pub type AudioChunks = mpsc::Receiver<Vec<u8>>;

/// An open synthesis call plus the channel its audio arrives on.
pub struct SynthesisStream {
    pub session: Box<dyn SynthesisSession>,
    pub audio: AudioChunks,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Opens a synthesis call that stops early once `interruption` is set.
    async fn open(&self, interruption: CancellationLatch) -> Result<SynthesisStream, SynthesisError>;
}

#[async_trait]
pub trait SynthesisSession: Send {
    /// Queues text for synthesis. Text that cleans to nothing is dropped.
    async fn write_text(&mut self, text: &str) -> Result<(), SynthesisError>;

    /// Marks the end of input. Buffered text is still synthesized and drained.
    async fn finalize(&mut self) -> Result<(), SynthesisError>;

    /// Raised when this call has drained or been canceled.
    fn completion(&self) -> CompletionSignal;
}

#[derive(Debug)]
pub struct SynthesisConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub voice: String,
    /// Backoff for reaching the speech endpoint.
    pub retry: RetryPolicy,
}

impl SynthesisConfig {
    pub fn new(endpoint: &str, api_key: &str, model: &str, voice: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: SecretString::from(api_key.to_string()),
            model: model.to_string(),
            voice: voice.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// HTTP speech synthesis. Each sentence is posted to the speech endpoint and
/// the raw PCM response body is streamed back chunk by chunk.
#[derive(Clone)]
pub struct SpeechSynthesizer {
    client: Client,
    config: Arc<SynthesisConfig>,
}

impl SpeechSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Synthesizer for SpeechSynthesizer {
    async fn open(&self, interruption: CancellationLatch) -> Result<SynthesisStream, SynthesisError> {
        if !self.config.endpoint.starts_with("https://") && !self.config.endpoint.starts_with("http://") {
            return Err(SynthesisError::Connection(format!(
                "unsupported synthesis endpoint: {}",
                self.config.endpoint
            )));
        }

        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let completion = CompletionSignal::new();

        let worker = SpeechWorker {
            client: self.client.clone(),
            config: self.config.clone(),
            interruption,
            audio: audio_tx,
        };
        let handle = tokio::spawn(worker.run(text_rx, completion.clone()));
        tracing::debug!("synthesis session opened");

        Ok(SynthesisStream {
            session: Box::new(SpeechSession {
                text: Some(text_tx),
                completion,
                worker: handle,
            }),
            audio: audio_rx,
        })
    }
}

struct SpeechSession {
    text: Option<mpsc::UnboundedSender<String>>,
    completion: CompletionSignal,
    worker: JoinHandle<()>,
}

#[async_trait]
impl SynthesisSession for SpeechSession {
    async fn write_text(&mut self, text: &str) -> Result<(), SynthesisError> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Ok(());
        }
        let Some(tx) = &self.text else {
            return Err(SynthesisError::Runtime("synthesis input already finalized".to_string()));
        };
        tx.send(cleaned).map_err(|_| self.stopped_error())
    }

    async fn finalize(&mut self) -> Result<(), SynthesisError> {
        // Dropping the sender lets the worker flush what is buffered and finish.
        self.text.take();
        Ok(())
    }

    fn completion(&self) -> CompletionSignal {
        self.completion.clone()
    }
}

impl SpeechSession {
    /// The error for a write after the worker has already given up.
    fn stopped_error(&self) -> SynthesisError {
        match self.completion.status() {
            Some(SynthesisStatus::Unreachable(reason)) => SynthesisError::Connection(reason),
            Some(SynthesisStatus::Canceled(reason)) => SynthesisError::Runtime(reason),
            _ => SynthesisError::Runtime("synthesis worker stopped".to_string()),
        }
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        if !self.worker.is_finished() && self.completion.status().is_none() && self.text.is_some() {
            // Dropped without finalize: nothing will ever flush the buffer.
            self.worker.abort();
        }
    }
}

/// Why the worker stopped speaking a sentence early.
enum Halt {
    Interrupted,
    Unreachable(String),
    Failed(String),
}

/// A single speech request that did not produce a response body.
#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("{0}")]
    Unreachable(String),
    #[error("{0}")]
    Failed(String),
}

impl Transient for RequestError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::Unreachable(error.to_string())
        } else {
            Self::Failed(error.to_string())
        }
    }
}

impl From<RequestError> for Halt {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::Unreachable(reason) => Self::Unreachable(reason),
            RequestError::Failed(reason) => Self::Failed(reason),
        }
    }
}

struct SpeechWorker {
    client: Client,
    config: Arc<SynthesisConfig>,
    interruption: CancellationLatch,
    audio: mpsc::Sender<Vec<u8>>,
}

impl SpeechWorker {
    async fn run(self, mut text: mpsc::UnboundedReceiver<String>, completion: CompletionSignal) {
        let mut pending = String::new();

        let status = loop {
            let next = tokio::select! {
                biased;
                _ = self.interruption.wait() => break Err(Halt::Interrupted),
                next = text.recv() => next,
            };

            match next {
                Some(fragment) => {
                    pending.push_str(&fragment);
                    if let Err(halt) = self.speak_ready(&mut pending).await {
                        break Err(halt);
                    }
                }
                None => {
                    let rest = pending.trim().to_string();
                    if !rest.is_empty() {
                        if let Err(halt) = self.speak(&rest).await {
                            break Err(halt);
                        }
                    }
                    break Ok(());
                }
            }
        };

        let status = match status {
            Ok(()) => {
                tracing::debug!("synthesis completed");
                SynthesisStatus::Completed
            }
            Err(Halt::Interrupted) => {
                tracing::debug!("synthesis interrupted");
                SynthesisStatus::Canceled("interrupted".to_string())
            }
            Err(Halt::Unreachable(reason)) => {
                tracing::error!("synthesis service unreachable: {}", reason);
                SynthesisStatus::Unreachable(reason)
            }
            Err(Halt::Failed(reason)) => {
                tracing::error!("synthesis canceled: {}", reason);
                SynthesisStatus::Canceled(reason)
            }
        };

        // Close the audio channel before announcing the outcome so the relay sees
        // every chunk first.
        drop(self.audio);
        completion.complete(status);
    }

    async fn speak_ready(&self, pending: &mut String) -> Result<(), Halt> {
        while let Some(sentence) = take_sentence(pending) {
            self.speak(&sentence).await?;
        }
        Ok(())
    }

    async fn speak(&self, sentence: &str) -> Result<(), Halt> {
        if self.interruption.is_cancelled() {
            return Err(Halt::Interrupted);
        }

        let request = self.config.retry.run(|attempt| self.request(sentence, attempt));
        let response = tokio::select! {
            biased;
            _ = self.interruption.wait() => return Err(Halt::Interrupted),
            response = request => response?,
        };

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            if self.interruption.is_cancelled() {
                return Err(Halt::Interrupted);
            }
            let chunk = chunk.map_err(|e| Halt::Failed(e.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            if self.audio.send(chunk.to_vec()).await.is_err() {
                // Nobody is relaying audio any more.
                return Err(Halt::Interrupted);
            }
        }
        Ok(())
    }

    /// Connect and timeout failures are retried; an error status is not.
    async fn request(&self, sentence: &str, attempt: u32) -> Result<reqwest::Response, RequestError> {
        tracing::debug!(attempt, chars = sentence.len(), "requesting speech");
        let body = SpeechRequest {
            model: &self.config.model,
            voice: &self.config.voice,
            input: sentence,
            response_format: "pcm",
        };
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        response
            .error_for_status()
            .map_err(|e| RequestError::Failed(e.to_string()))
    }
}
