//! Ollama provider implementation for Suikou
//!
//! This module implements the Provider trait for Ollama, connecting to a
//! local or remote Ollama server. With streaming enabled, `/api/chat`
//! answers with newline-delimited JSON objects, one per generated chunk,
//! which are turned into a [`DeltaStream`].

use crate::config::OllamaConfig;
use crate::error::{Result, SuikouError};
use crate::providers::{DeltaStream, Generation, GenerationOptions, Message, Provider};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Ollama API provider
///
/// # Examples
///
/// ```no_run
/// use suikou::config::OllamaConfig;
/// use suikou::providers::{GenerationOptions, Message, OllamaProvider, Provider};
///
/// # async fn example() -> suikou::error::Result<()> {
/// let provider = OllamaProvider::new(OllamaConfig::default())?;
/// let messages = vec![Message::user("Hello!")];
/// let generation = provider.generate(&messages, &GenerationOptions::default()).await?;
/// let text = generation.collect_text().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

/// Sampling options in Ollama's naming
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Message structure in Ollama responses
#[derive(Debug, Deserialize, Default)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// One response object (the whole answer, or one streamed chunk)
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::config::OllamaConfig;
    /// use suikou::providers::OllamaProvider;
    ///
    /// let provider = OllamaProvider::new(OllamaConfig::default());
    /// assert!(provider.is_ok());
    /// ```
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("suikou/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SuikouError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }
}

/// Parse one NDJSON line into its delta and `done` flag
fn parse_chunk_line(line: &str) -> Result<(String, bool)> {
    let chunk: OllamaChunk = serde_json::from_str(line).map_err(|e| {
        SuikouError::Generation(format!("Malformed Ollama stream chunk: {}", e))
    })?;
    if let Some(error) = chunk.error {
        return Err(SuikouError::Generation(format!("Ollama error: {}", error)).into());
    }
    Ok((chunk.message.content, chunk.done))
}

/// Turn an NDJSON byte stream into a stream of content deltas
///
/// Lines are split on raw bytes so a UTF-8 sequence cut across two network
/// chunks is decoded only once it is complete. Empty deltas are skipped.
/// The stream ends at the first object with `done: true` or when the body
/// ends.
pub(crate) fn ndjson_deltas<S>(byte_stream: S) -> DeltaStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    struct State<S> {
        bytes: std::pin::Pin<Box<S>>,
        buffer: Vec<u8>,
        ready: VecDeque<String>,
        failed: Option<anyhow::Error>,
        done: bool,
    }

    // A bad line stops parsing; the error is held until every delta
    // decoded before it has been yielded.
    fn drain_lines<S>(state: &mut State<S>, flush: bool) {
        while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = state.buffer.drain(..=pos).collect();
            if let Err(e) = push_line(state, &line) {
                state.failed = Some(e);
                return;
            }
        }
        if flush && !state.buffer.is_empty() {
            let line = std::mem::take(&mut state.buffer);
            if let Err(e) = push_line(state, &line) {
                state.failed = Some(e);
            }
        }
    }

    fn push_line<S>(state: &mut State<S>, line: &[u8]) -> Result<()> {
        if state.done {
            return Ok(());
        }
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let (delta, done) = parse_chunk_line(line)?;
        if !delta.is_empty() {
            state.ready.push_back(delta);
        }
        state.done = done;
        Ok(())
    }

    let state = State {
        bytes: Box::pin(byte_stream),
        buffer: Vec::new(),
        ready: VecDeque::new(),
        failed: None,
        done: false,
    };

    Box::pin(futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.ready.pop_front() {
                return Ok(Some((delta, state)));
            }
            if let Some(e) = state.failed.take() {
                return Err(e);
            }
            if state.done {
                return Ok(None);
            }
            match state.bytes.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| {
                        SuikouError::Generation(format!("Ollama stream interrupted: {}", e))
                    })?;
                    state.buffer.extend_from_slice(&chunk);
                    drain_lines(&mut state, false);
                }
                None => {
                    drain_lines(&mut state, true);
                    state.done = true;
                }
            }
        }
    }))
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Generation> {
        let request = OllamaRequest {
            model: &self.config.model,
            messages,
            stream: options.stream,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        tracing::debug!(
            "Sending Ollama request: {} messages, stream={}",
            messages.len(),
            options.stream
        );

        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                SuikouError::Generation(format!("Ollama request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(SuikouError::Generation(format!(
                "Ollama returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        if options.stream {
            return Ok(Generation::Stream(ndjson_deltas(response.bytes_stream())));
        }

        let body = response.text().await.map_err(|e| {
            SuikouError::Generation(format!("Failed to read Ollama response: {}", e))
        })?;
        let (content, _) = parse_chunk_line(body.trim())?;
        Ok(Generation::Complete(content))
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("/api/tags"))
            .send()
            .await
            .map_err(|e| SuikouError::Provider(format!("Ollama unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(SuikouError::Provider(format!(
                "Ollama health check returned {}",
                response.status()
            ))
            .into());
        }
        Ok(())
    }
}
