//! Base provider trait and common types for Suikou
//!
//! This module defines the Provider trait that every AI backend must
//! implement, along with the message, option, and generation types that
//! flow between the orchestrator and a backend.

use crate::error::Result;
use crate::session::{Role, Turn};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message structure for a provider request
///
/// Represents a message in the conversation with the AI provider.
/// Roles are `system`, `user`, or `assistant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::providers::Message;
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::providers::Message;
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, "assistant");
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::providers::Message;
    ///
    /// let msg = Message::system("You are an editor");
    /// assert_eq!(msg.role, "system");
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// True for system messages
    pub fn is_system(&self) -> bool {
        self.role == "system"
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => Self::user(turn.content.clone()),
            Role::Assistant => Self::assistant(turn.content.clone()),
        }
    }
}

/// Sampling options passed with every generation request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Ask the backend for incremental deltas when it supports them
    pub stream: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            stream: true,
        }
    }
}

/// A lazy, finite, non-restartable sequence of text deltas
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What a provider hands back for one request
pub enum Generation {
    /// The whole answer at once (non-streaming backends)
    Complete(String),
    /// Incremental deltas
    Stream(DeltaStream),
}

impl Generation {
    /// Build a streaming generation from already-known deltas
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// use suikou::providers::Generation;
    ///
    /// # tokio_test::block_on(async {
    /// let generation = Generation::from_deltas(["Hel", "lo"]);
    /// let text = generation.collect_text().await.unwrap();
    /// assert_eq!(text, "Hello");
    /// # });
    /// ```
    pub fn from_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<Result<String>> = deltas.into_iter().map(|d| Ok(d.into())).collect();
        Self::Stream(Box::pin(stream::iter(items)))
    }

    /// View the generation as a delta stream
    ///
    /// A complete answer becomes a single-item stream.
    pub fn into_stream(self) -> DeltaStream {
        match self {
            Self::Complete(text) => Box::pin(stream::once(async move { Ok(text) })),
            Self::Stream(deltas) => deltas,
        }
    }

    /// Drain the generation into one string
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the stream
    pub async fn collect_text(self) -> Result<String> {
        match self {
            Self::Complete(text) => Ok(text),
            Self::Stream(mut deltas) => {
                let mut text = String::new();
                while let Some(delta) = deltas.next().await {
                    text.push_str(&delta?);
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Provider trait for AI backends
///
/// All backends (local inference, remote HTTP service, CLI program) must
/// implement this trait. Failures are returned as errors carrying a
/// human-readable message; a stream may also fail mid-way by yielding an
/// error item.
///
/// # Examples
///
/// ```no_run
/// use suikou::providers::{Generation, GenerationOptions, Message, Provider};
/// use suikou::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn generate(
///         &self,
///         messages: &[Message],
///         _options: &GenerationOptions,
///     ) -> Result<Generation> {
///         let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(Generation::Complete(last))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Generate a response for the given conversation
    ///
    /// # Arguments
    ///
    /// * `messages` - System instruction followed by the conversation
    /// * `options` - Sampling options
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be made or the backend rejects it
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Generation>;

    /// Check that the backend is reachable and ready
    ///
    /// # Default Implementation
    ///
    /// The default implementation reports the backend as ready.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
