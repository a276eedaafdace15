use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Single-slot, latest-wins hand-off between the transcription receive loop and
/// the turn loop.
///
/// A publish overwrites any value the turn loop has not taken yet, so finals that
/// arrive faster than replies are generated coalesce into the most recent one.
#[derive(Debug, Default)]
pub struct TranscriptMailbox {
    slot: Mutex<Option<String>>,
    ready: Notify,
}

impl TranscriptMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `text` and raises the ready signal. Returns the unconsumed value it
    /// displaced, if any.
    pub fn publish(&self, text: impl Into<String>) -> Option<String> {
        let displaced = self.lock().replace(text.into());
        self.ready.notify_waiters();
        displaced
    }

    /// Returns the stored value and lowers the ready signal.
    pub fn take_and_clear(&self) -> Option<String> {
        self.lock().take()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_some()
    }

    /// Suspends until a value is available.
    pub async fn await_ready(&self) {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register before checking so a publish in between is not missed.
            notified.as_mut().enable();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
