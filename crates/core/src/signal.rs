//! Signals shared between the tasks of one conversation.
//!
//! [`CancellationLatch`] is the turn-scoped "user interrupted" flag. It is set
//! by the transcription receive loop and observed by the generation pipeline
//! and the synthesis worker. [`CompletionSignal`] is raised once per synthesis
//! call when the synthesizer has drained or given up.

use std::sync::Arc;
use tokio::sync::watch;

/// Resettable, idempotent interruption flag.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancellationLatch {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancellationLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationLatch {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Sets the latch. Returns `true` only for the unset -> set transition,
    /// which is also the only time waiters are woken.
    pub fn cancel(&self) -> bool {
        self.state.send_if_modified(|set| {
            if *set {
                false
            } else {
                *set = true;
                true
            }
        })
    }

    /// Clears the latch if it is set; a no-op otherwise.
    pub fn reset(&self) -> bool {
        self.state.send_if_modified(|set| {
            if *set {
                *set = false;
                true
            } else {
                false
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Suspends until the latch is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// How a synthesis call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisStatus {
    Completed,
    Canceled(String),
    /// The service could not be reached, even after retrying.
    Unreachable(String),
}

/// One-shot status for a single synthesis call. The first status wins.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    state: Arc<watch::Sender<Option<SynthesisStatus>>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn complete(&self, status: SynthesisStatus) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                *current = Some(status);
                true
            }
        })
    }

    pub fn status(&self) -> Option<SynthesisStatus> {
        self.state.borrow().clone()
    }

    pub async fn wait(&self) -> SynthesisStatus {
        let mut rx = self.state.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(status) => status.clone().unwrap_or(SynthesisStatus::Completed),
            Err(_) => SynthesisStatus::Canceled("completion signal dropped".to_string()),
        }
    }
}
