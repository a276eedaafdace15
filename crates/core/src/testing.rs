//! Hand-written fakes shared by the unit tests.

use crate::completion::{ChatHistory, CompletionProvider, FragmentStream};
use crate::signal::{CancellationLatch, CompletionSignal, SynthesisStatus};
use crate::synthesis::{SynthesisError, SynthesisSession, SynthesisStream, Synthesizer};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use realtime_voice_types::OutboundMessage;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type SendHook = Arc<dyn Fn(&OutboundMessage) + Send + Sync>;

/// Decodes and records every message sent.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    hook: Option<SendHook>,
}

impl RecordingTransport {
    pub(crate) fn with_hook(hook: impl Fn(&OutboundMessage) + Send + Sync + 'static) -> Self {
        Self {
            sent: Arc::default(),
            hook: Some(Arc::new(hook)),
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn text_outputs(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                OutboundMessage::TextOutput { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: String) -> Result<(), TransportError> {
        let message: OutboundMessage = serde_json::from_str(&message)?;
        self.sent.lock().unwrap().push(message.clone());
        if let Some(hook) = &self.hook {
            hook(&message);
        }
        Ok(())
    }
}

/// Replays a fixed list of fragments and records which ones were pulled.
#[derive(Clone, Default)]
pub(crate) struct ScriptedCompletion {
    fragments: Vec<Result<String, String>>,
    pulled: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<(usize, String)>>>,
}

impl ScriptedCompletion {
    pub(crate) fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn failing_after(fragments: &[&str], error: &str) -> Self {
        let mut scripted = Self::new(fragments);
        scripted.fragments.push(Err(error.to_string()));
        scripted
    }

    pub(crate) fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }

    /// `(history length, user text)` for every request made.
    pub(crate) fn requests(&self) -> Vec<(usize, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn stream_reply(&self, history: &ChatHistory, user_text: &str) -> anyhow::Result<FragmentStream> {
        self.requests.lock().unwrap().push((history.len(), user_text.to_string()));
        let pulled = self.pulled.clone();
        let fragments = stream::iter(self.fragments.clone()).map(move |fragment| match fragment {
            Ok(text) => {
                pulled.lock().unwrap().push(text.clone());
                Ok(text)
            }
            Err(e) => Err(anyhow::anyhow!(e)),
        });
        Ok(fragments.boxed())
    }
}

/// Echoes every written fragment back as one audio chunk and completes on
/// finalize with a configurable status.
#[derive(Clone, Default)]
pub(crate) struct FakeSynthesizer {
    written: Arc<Mutex<Vec<String>>>,
    open_error: Option<SynthesisError>,
    finish_with: Option<SynthesisStatus>,
    latches: Arc<Mutex<Vec<bool>>>,
}

impl FakeSynthesizer {
    pub(crate) fn failing_to_open(error: SynthesisError) -> Self {
        Self {
            open_error: Some(error),
            ..Default::default()
        }
    }

    pub(crate) fn canceling_with(reason: &str) -> Self {
        Self {
            finish_with: Some(SynthesisStatus::Canceled(reason.to_string())),
            ..Default::default()
        }
    }

    pub(crate) fn unreachable_with(reason: &str) -> Self {
        Self {
            finish_with: Some(SynthesisStatus::Unreachable(reason.to_string())),
            ..Default::default()
        }
    }

    pub(crate) fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    /// Latch state observed at each `open`.
    pub(crate) fn latch_states_at_open(&self) -> Vec<bool> {
        self.latches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn open(&self, interruption: CancellationLatch) -> Result<SynthesisStream, SynthesisError> {
        self.latches.lock().unwrap().push(interruption.is_cancelled());
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        let (tx, rx) = mpsc::channel(64);
        Ok(SynthesisStream {
            session: Box::new(FakeSession {
                audio: Some(tx),
                written: self.written.clone(),
                finish_with: self.finish_with.clone(),
                completion: CompletionSignal::new(),
            }),
            audio: rx,
        })
    }
}

struct FakeSession {
    audio: Option<mpsc::Sender<Vec<u8>>>,
    written: Arc<Mutex<Vec<String>>>,
    finish_with: Option<SynthesisStatus>,
    completion: CompletionSignal,
}

#[async_trait]
impl SynthesisSession for FakeSession {
    async fn write_text(&mut self, text: &str) -> Result<(), SynthesisError> {
        self.written.lock().unwrap().push(text.to_string());
        if let Some(audio) = &self.audio {
            let _ = audio.send(text.as_bytes().to_vec()).await;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), SynthesisError> {
        self.audio.take();
        let status = self.finish_with.clone().unwrap_or(SynthesisStatus::Completed);
        self.completion.complete(status);
        Ok(())
    }

    fn completion(&self) -> CompletionSignal {
        self.completion.clone()
    }
}
