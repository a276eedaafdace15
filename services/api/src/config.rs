use realtime_stt::{SttError, TranscriptionConfig};
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;
use voice_core::{CompletionConfig, SessionOptions, SynthesisConfig};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "gpt-4o";
const DEFAULT_TTS_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";
const DEFAULT_TTS_MODEL: &str = "gpt-4o-mini-tts";
const DEFAULT_TTS_VOICE: &str = "alloy";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Transcription stream settings. Voice activity values left unset keep the
/// library defaults.
#[derive(Clone, Debug)]
pub struct SttSettings {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub instructions: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TtsSettings {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub voice: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub stt: SttSettings,
    pub llm: LlmSettings,
    pub tts: TtsSettings,
    pub interrupt_agent: bool,
    /// `RUST_LOG` directives for the log filter.
    pub log_filter: String,
}

impl Config {
    /// Loads configuration from environment variables, reading a `.env` file in
    /// the current directory first if there is one.
    ///
    /// Required: `STT_ENDPOINT`, `STT_API_KEY`, `LLM_API_KEY`, `TTS_API_KEY`.
    /// Everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let bind_address = parse_value::<SocketAddr>("BIND_ADDRESS", &or_default("BIND_ADDRESS", DEFAULT_BIND_ADDRESS))?;

        let stt = SttSettings {
            endpoint: required("STT_ENDPOINT")?,
            api_key: SecretString::from(required("STT_API_KEY")?),
            model: lookup("STT_MODEL"),
            prompt: lookup("STT_SERVER_PROMPT"),
            threshold: parse_optional(&lookup, "STT_THRESHOLD")?,
            prefix_padding_ms: parse_optional(&lookup, "STT_PREFIX_PADDING_MS")?,
            silence_duration_ms: parse_optional(&lookup, "STT_SILENCE_DURATION_MS")?,
        };

        let llm = LlmSettings {
            endpoint: or_default("LLM_ENDPOINT", DEFAULT_LLM_ENDPOINT),
            api_key: SecretString::from(required("LLM_API_KEY")?),
            model: or_default("LLM_MODEL", DEFAULT_LLM_MODEL),
            instructions: lookup("LLM_INSTRUCTIONS"),
        };

        let tts = TtsSettings {
            endpoint: or_default("TTS_ENDPOINT", DEFAULT_TTS_ENDPOINT),
            api_key: SecretString::from(required("TTS_API_KEY")?),
            model: or_default("TTS_MODEL", DEFAULT_TTS_MODEL),
            voice: or_default("TTS_VOICE", DEFAULT_TTS_VOICE),
        };

        let interrupt_agent = parse_value::<bool>("INTERRUPT_AGENT", &or_default("INTERRUPT_AGENT", "false"))?;

        let log_filter = or_default("RUST_LOG", "info");
        EnvFilter::try_new(&log_filter)
            .map_err(|e| ConfigError::InvalidValue("RUST_LOG".to_string(), e.to_string()))?;

        Ok(Self {
            bind_address,
            stt,
            llm,
            tts,
            interrupt_agent,
            log_filter,
        })
    }

    pub fn transcription_config(&self) -> Result<TranscriptionConfig, SttError> {
        let stt = &self.stt;
        let mut builder = TranscriptionConfig::builder(&stt.endpoint).with_api_key(stt.api_key.expose_secret());
        if let Some(model) = &stt.model {
            builder = builder.with_model(model);
        }
        if let Some(prompt) = &stt.prompt {
            builder = builder.with_prompt(prompt);
        }
        if let Some(threshold) = stt.threshold {
            builder = builder.with_threshold(threshold);
        }
        if let Some(prefix_padding_ms) = stt.prefix_padding_ms {
            builder = builder.with_prefix_padding_ms(prefix_padding_ms);
        }
        if let Some(silence_duration_ms) = stt.silence_duration_ms {
            builder = builder.with_silence_duration_ms(silence_duration_ms);
        }
        builder.build()
    }

    pub fn completion_config(&self) -> CompletionConfig {
        let llm = &self.llm;
        let config = CompletionConfig::new(&llm.endpoint, llm.api_key.expose_secret(), &llm.model);
        match &llm.instructions {
            Some(instructions) => config.with_instructions(instructions),
            None => config,
        }
    }

    pub fn synthesis_config(&self) -> SynthesisConfig {
        let tts = &self.tts;
        SynthesisConfig::new(&tts.endpoint, tts.api_key.expose_secret(), &tts.model, &tts.voice)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            interrupt_enabled: self.interrupt_agent,
        }
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_optional<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name).map(|raw| parse_value(name, &raw)).transpose()
}
