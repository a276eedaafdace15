#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad(ServerVadTurnDetection),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServerVadTurnDetection {
    /// Activation threshold for VAD(0.0 to 1.0).
    threshold: f32,

    /// Amount of audio to include before speech starts, in milliseconds
    prefix_padding_ms: u32,

    /// Duration fo silence to detect speech stop, in milliseconds
    silence_duration_ms: u32,
}

/// Raised when a VAD parameter is outside the range the provider accepts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid turn detection: {0}")]
pub struct TurnDetectionError(pub String);

impl Default for TurnDetection {
    fn default() -> Self {
        Self::ServerVad(ServerVadTurnDetection::default())
    }
}

impl TurnDetection {
    pub fn validate(&self) -> Result<(), TurnDetectionError> {
        match self {
            Self::ServerVad(vad) => vad.validate(),
        }
    }
}

impl Default for ServerVadTurnDetection {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 300,
        }
    }
}

impl ServerVadTurnDetection {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_prefix_padding_ms(mut self, prefix_padding_ms: u32) -> Self {
        self.prefix_padding_ms = prefix_padding_ms;
        self
    }

    pub fn with_silence_duration_ms(mut self, silence_duration_ms: u32) -> Self {
        self.silence_duration_ms = silence_duration_ms;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn prefix_padding_ms(&self) -> u32 {
        self.prefix_padding_ms
    }

    pub fn silence_duration_ms(&self) -> u32 {
        self.silence_duration_ms
    }

    /// Padding and silence are unsigned by construction, so only the threshold needs checking.
    pub fn validate(&self) -> Result<(), TurnDetectionError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TurnDetectionError(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_server_vad_tag() {
        let detection = TurnDetection::ServerVad(
            ServerVadTurnDetection::default()
                .with_threshold(0.6)
                .with_prefix_padding_ms(200)
                .with_silence_duration_ms(500),
        );
        let json = serde_json::to_value(&detection).unwrap();
        assert_eq!(json["type"], "server_vad");
        assert_eq!(json["prefix_padding_ms"], 200);
        assert_eq!(json["silence_duration_ms"], 500);
        assert!((json["threshold"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let too_high = ServerVadTurnDetection::default().with_threshold(1.5);
        assert!(too_high.validate().is_err());

        let negative = ServerVadTurnDetection::default().with_threshold(-0.1);
        assert!(negative.validate().is_err());

        let edge = ServerVadTurnDetection::default().with_threshold(1.0);
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn error_names_the_offending_value() {
        let error = ServerVadTurnDetection::default().with_threshold(2.0).validate().unwrap_err();

        assert_eq!(error.to_string(), "invalid turn detection: threshold must be within [0, 1], got 2");
    }
}
