/// Counters for one supervisor, shared with its receive loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    audio_frames_sent: u64,
    finals_received: u64,
    interruptions: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_audio_frame(&mut self) {
        self.audio_frames_sent += 1;
    }

    pub(crate) fn record_final(&mut self) {
        self.finals_received += 1;
    }

    pub(crate) fn record_interruption(&mut self) {
        self.interruptions += 1;
    }

    pub fn audio_frames_sent(&self) -> u64 {
        self.audio_frames_sent
    }

    pub fn finals_received(&self) -> u64 {
        self.finals_received
    }

    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }
}
