//! Test utilities for Suikou
//!
//! Scripted providers, a store that records every committed snapshot,
//! and small helpers shared by the unit tests.

use crate::config::Config;
use crate::error::{Result, SuikouError};
use crate::providers::{DeltaStream, Generation, GenerationOptions, Message, Provider};
use crate::session::SessionRecord;
use crate::store::{MemoryStore, SessionStore, Subscription, UpdateFn};

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!(
            "Expected error containing '{}' but got Ok({:?})",
            expected, value
        ),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration with default values
pub fn test_config() -> Config {
    Config::default()
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
provider:
  type: command
  command:
    program: cat
    args: []
generation:
  temperature: 0.2
  max_tokens: 200
  timeout_seconds: 5
  stream: true
store:
  backend: memory
streaming:
  min_write_interval_ms: 50
server:
  bind: 127.0.0.1:0
"#
    .to_string()
}

/// A stream that yields `deltas` and then fails with `message`
pub fn failing_stream(deltas: &[&str], message: &str) -> DeltaStream {
    let mut items: Vec<Result<String>> = deltas.iter().map(|d| Ok(d.to_string())).collect();
    items.push(Err(SuikouError::Generation(message.to_string()).into()));
    Box::pin(stream::iter(items))
}

/// What a [`ScriptedProvider`] does for one call
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these deltas and end normally
    Deltas(Vec<String>),
    /// Stream these deltas, then fail mid-stream
    FailAfter(Vec<String>, String),
    /// Reject the request before streaming
    Reject(String),
    /// Never produce anything
    Stall,
    /// Stream the first delta, wait for `release`, then stream the rest
    Held(Vec<String>, Arc<Notify>),
}

impl Script {
    /// Deltas from string slices
    pub fn deltas(deltas: &[&str]) -> Self {
        Self::Deltas(deltas.iter().map(|d| d.to_string()).collect())
    }
}

/// Provider that plays back a queue of [`Script`]s and records requests
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    /// Provider that plays `scripts` in order
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every message list passed to `generate`, in call order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<Generation> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Deltas(Vec::new()));

        match script {
            Script::Deltas(deltas) => Ok(Generation::from_deltas(deltas)),
            Script::FailAfter(deltas, message) => {
                let refs: Vec<&str> = deltas.iter().map(String::as_str).collect();
                Ok(Generation::Stream(failing_stream(&refs, &message)))
            }
            Script::Reject(message) => Err(SuikouError::Generation(message).into()),
            Script::Stall => Ok(Generation::Stream(Box::pin(
                stream::pending::<Result<String>>(),
            ))),
            Script::Held(deltas, release) => {
                let mut deltas: VecDeque<String> = deltas.into();
                let first = deltas.pop_front();
                let held = stream::unfold(
                    (first, deltas, Some(release)),
                    |(first, mut rest, release)| async move {
                        if let Some(delta) = first {
                            return Some((Ok::<_, anyhow::Error>(delta), (None, rest, release)));
                        }
                        if let Some(release) = release {
                            release.notified().await;
                        }
                        rest.pop_front()
                            .map(|delta| (Ok(delta), (None, rest, None)))
                    },
                );
                Ok(Generation::Stream(Box::pin(held)))
            }
        }
    }
}

/// Store wrapper that logs every committed write (`Some`) and clear (`None`)
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    log: Mutex<Vec<Option<SessionRecord>>>,
}

impl RecordingStore {
    /// Empty recording store
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the log
    pub fn take(&self) -> Vec<Option<SessionRecord>> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn read(&self) -> Result<Option<SessionRecord>> {
        self.inner.read().await
    }

    async fn update(&self, f: UpdateFn<'_>) -> Result<Option<SessionRecord>> {
        let committed = self.inner.update(f).await?;
        if let Some(record) = &committed {
            self.log.lock().unwrap().push(Some(record.clone()));
        }
        Ok(committed)
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await?;
        self.log.lock().unwrap().push(None);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<()> = Err(SuikouError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_yaml_parses_and_validates() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.provider_type, "command");
    }

    #[tokio::test]
    async fn test_scripted_provider_plays_in_order() {
        let provider = ScriptedProvider::new([Script::deltas(&["a"]), Script::Reject("no".into())]);
        let first = provider
            .generate(&[Message::user("1")], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(first.collect_text().await.unwrap(), "a");
        assert!(provider
            .generate(&[Message::user("2")], &GenerationOptions::default())
            .await
            .is_err());
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_held_script_waits_for_release() {
        let release = Arc::new(Notify::new());
        let provider = ScriptedProvider::new([Script::Held(
            vec!["a".into(), "b".into()],
            release.clone(),
        )]);
        let mut stream = provider
            .generate(&[], &GenerationOptions::default())
            .await
            .unwrap()
            .into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        release.notify_one();
        assert_eq!(stream.next().await.unwrap().unwrap(), "b");
        assert!(stream.next().await.is_none());
    }
}
