/// Transcription model settings sent as part of the session configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscription {
    /// The deployment or model name, e.g. "gpt-4o-transcribe"
    model: String,
    /// Free-form prompt used to bias the transcription
    #[serde(default)]
    prompt: String,
}

impl Default for InputAudioTranscription {
    fn default() -> Self {
        Self {
            model: "gpt-4o-transcribe".to_string(),
            prompt: String::new(),
        }
    }
}

impl InputAudioTranscription {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: String::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}
