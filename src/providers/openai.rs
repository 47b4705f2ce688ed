//! OpenAI-compatible chat completions client
//!
//! Implements [`CompletionClient`] against `POST {api_base}/chat/completions`.
//! Non-streaming requests return the first choice's content. Streaming
//! requests return a [`FragmentStream`] decoded from the line-oriented
//! `data: {json}` response body.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::{ColloquyError, Result};
use crate::providers::{CompletionClient, CompletionError, FragmentStream, Message};

/// Event prefix carried by every streamed line
const EVENT_PREFIX: &str = "data:";

/// Request body for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Non-streaming response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One streamed line's payload
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible completion client
///
/// # Examples
///
/// ```
/// use colloquy::config::ProviderConfig;
/// use colloquy::providers::OpenAiClient;
///
/// let client = OpenAiClient::new(&ProviderConfig::default(), "sk-test").unwrap();
/// assert_eq!(client.model(), "gpt-3.5-turbo");
/// ```
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    request_timeout: Duration,
}

impl OpenAiClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::Config` if the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(concat!("colloquy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ColloquyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = format!(
            "{}/chat/completions",
            config.api_base.trim().trim_end_matches('/')
        );

        tracing::info!(
            "Initialized completion client: endpoint={}, model={}",
            endpoint,
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    /// Model name sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full URL of the chat completions endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> std::result::Result<reqwest::Response, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream,
        };

        tracing::debug!(
            "Sending completion request: {} messages, stream={}",
            messages.len(),
            stream
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        if stream {
            request = request.header("Accept", "text/event-stream");
        } else {
            request = request.timeout(self.request_timeout);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Completion request failed: {}", e);
            CompletionError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Completion service returned error {}: {}", status, body);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> std::result::Result<String, CompletionError> {
        let response = self.send(messages, false).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        let parsed: ChatResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!("Failed to parse completion response: {}", e);
            CompletionError::Decode(e.to_string())
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::Empty)?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn stream(
        &self,
        messages: &[Message],
    ) -> std::result::Result<FragmentStream, CompletionError> {
        let response = self.send(messages, true).await?;
        Ok(decode_fragments(response.bytes_stream()))
    }
}

/// Decode one line of a streaming response into a content fragment
///
/// Returns `None` for blank lines, lines that are not valid JSON after the
/// optional `data:` prefix (including the `[DONE]` sentinel), chunks
/// without choices, and empty deltas.
///
/// # Examples
///
/// ```
/// use colloquy::providers::openai::decode_stream_line;
///
/// let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
/// assert_eq!(decode_stream_line(line), Some("Hel".to_string()));
/// assert_eq!(decode_stream_line("data: [DONE]"), None);
/// assert_eq!(decode_stream_line(""), None);
/// ```
pub fn decode_stream_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return None;
    }

    let payload = match line.strip_prefix(EVENT_PREFIX) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    };

    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    let content = chunk.choices.into_iter().next()?.delta.content?;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Line framing state for [`decode_fragments`]
struct LineDecoder<S> {
    inner: S,
    buffer: BytesMut,
    pending: VecDeque<std::result::Result<String, CompletionError>>,
    finished: bool,
}

impl<S> LineDecoder<S> {
    fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            self.decode_line(&line);
        }
    }

    fn flush_tail(&mut self) {
        if !self.buffer.is_empty() {
            let line = self.buffer.split();
            self.decode_line(&line);
        }
    }

    fn decode_line(&mut self, line: &[u8]) {
        match std::str::from_utf8(line) {
            Ok(text) => {
                if let Some(fragment) = decode_stream_line(text) {
                    self.pending.push_back(Ok(fragment));
                }
            }
            Err(e) => tracing::debug!("Dropping non-UTF-8 stream line: {}", e),
        }
    }
}

/// Turn a raw response body into an ordered fragment stream
///
/// Bytes are framed into `\n`-terminated lines (partial lines are buffered
/// across chunks) and each line goes through [`decode_stream_line`].
/// Undecodable lines are dropped without ending the stream. A body error
/// is yielded once as `CompletionError::Transport`, after which the stream
/// ends.
pub fn decode_fragments<S, E>(byte_stream: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = LineDecoder {
        inner: Box::pin(byte_stream),
        buffer: BytesMut::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => state.push_chunk(&chunk),
                Some(Err(e)) => {
                    tracing::error!("Completion stream interrupted: {}", e);
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(CompletionError::Transport(e.to_string())));
                }
                None => {
                    state.finished = true;
                    state.flush_tail();
                }
            }
        }
    })
    .boxed()
}
