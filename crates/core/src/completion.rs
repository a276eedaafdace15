//! Streamed reply generation.
//!
//! [`CompletionProvider`] is the port the generation pipeline pulls fragments
//! from. [`ChatCompletionClient`] implements it against any OpenAI-compatible
//! `chat/completions` endpoint using server-sent events.

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use realtime_voice_types::Role;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Lazy, finite, non-restartable sequence of reply fragments. The consumer may
/// drop it at any point; nothing further is requested once it is dropped.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Conversation context for one session. Only the turn loop mutates it, one
/// turn at a time.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Starts a reply to `user_text` given the prior conversation.
    async fn stream_reply(&self, history: &ChatHistory, user_text: &str) -> Result<FragmentStream>;
}

#[derive(Debug)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: f32,
    pub instructions: Option<String>,
}

impl CompletionConfig {
    pub const DEFAULT_TEMPERATURE: f32 = 0.1;

    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: SecretString::from(api_key.to_string()),
            model: model.to_string(),
            temperature: Self::DEFAULT_TEMPERATURE,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

pub struct ChatCompletionClient {
    client: Client,
    config: CompletionConfig,
}

impl ChatCompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_messages(&self, history: &ChatHistory, user_text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(instructions) = &self.config.instructions {
            messages.push(ChatMessage {
                role: Role::System,
                content: instructions.clone(),
            });
        }
        messages.extend(history.messages().iter().cloned());
        messages.push(ChatMessage {
            role: Role::User,
            content: user_text.to_string(),
        });
        messages
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    async fn stream_reply(&self, history: &ChatHistory, user_text: &str) -> Result<FragmentStream> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: self.request_messages(history, user_text),
            temperature: self.config.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("failed to reach completion endpoint")?
            .error_for_status()
            .context("completion endpoint rejected the request")?;

        tracing::debug!(model = %self.config.model, "completion stream opened");
        Ok(sse_fragments(response.bytes_stream()).boxed())
    }
}

/// One decoded SSE line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(chunk) => match chunk["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => SseLine::Fragment(content.to_string()),
            _ => SseLine::Skip,
        },
        Err(e) => {
            tracing::warn!("skipping undecodable completion chunk: {}", e);
            SseLine::Skip
        }
    }
}

/// Turns an SSE byte stream into non-empty content fragments. Lines may be split
/// across network chunks, so bytes are buffered until a newline arrives.
fn sse_fragments<S, B>(body: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.context("completion stream interrupted")?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Fragment(text) => {
                        yield text;
                    }
                    SseLine::Done => break 'read,
                    SseLine::Skip => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Fragment("Hi".into()));
    }

    #[test]
    fn skips_role_only_and_comment_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
    }

    #[test]
    fn recognizes_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
    }

    #[tokio::test]
    async fn fragments_survive_chunk_splits() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_vec()),
            Ok(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n".to_vec()),
            Ok(b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".to_vec()),
        ];

        let fragments: Vec<String> = sse_fragments(stream::iter(chunks))
            .map(|fragment| fragment.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["Hello".to_string(), " world".to_string()]);
    }

    #[test]
    fn history_is_sent_between_instructions_and_new_text() {
        let client = ChatCompletionClient::new(
            CompletionConfig::new("https://llm.test/v1/chat/completions", "key", "gpt-4o-mini")
                .with_instructions("Be brief."),
        );
        let mut history = ChatHistory::new();
        history.push(Role::User, "hi");
        history.push(Role::Assistant, "hello");

        let messages = client.request_messages(&history, "how are you");

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[3].content, "how are you");
    }
}
