use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

use suikou::error::{Result, SuikouError};
use suikou::providers::{Generation, GenerationOptions, Message, Provider};
use suikou::session::{SessionRecord, SessionStatus};
use suikou::store::{MemoryStore, SessionStore, Subscription, UpdateFn};

/// One canned provider answer
#[allow(dead_code)]
pub enum Reply {
    /// Stream these deltas
    Deltas(Vec<&'static str>),
    /// Fail before streaming
    Fail(&'static str),
    /// Never produce anything
    Silent,
    /// Yield the first delta, wait for the gate, then the rest
    Gated(Vec<&'static str>, Arc<Notify>),
}

/// Provider that answers from a queue of [`Reply`]s
#[allow(dead_code)]
#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<Generation> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Deltas(Vec::new()));

        match reply {
            Reply::Deltas(deltas) => Ok(Generation::from_deltas(deltas)),
            Reply::Fail(message) => Err(SuikouError::Generation(message.to_string()).into()),
            Reply::Silent => Ok(Generation::Stream(Box::pin(stream::pending::<Result<String>>()))),
            Reply::Gated(deltas, gate) => {
                let mut rest: VecDeque<&'static str> = deltas.into();
                let first = rest.pop_front();
                let gated = stream::unfold(
                    (first, rest, Some(gate)),
                    |(first, mut rest, gate)| async move {
                        if let Some(delta) = first {
                            return Some((
                                Ok::<_, anyhow::Error>(delta.to_string()),
                                (None, rest, gate),
                            ));
                        }
                        if let Some(gate) = gate {
                            gate.notified().await;
                        }
                        rest.pop_front()
                            .map(|delta| (Ok(delta.to_string()), (None, rest, None)))
                    },
                );
                Ok(Generation::Stream(Box::pin(gated)))
            }
        }
    }
}

/// Wait until the stored session reaches `status`
#[allow(dead_code)]
pub async fn wait_for_status(store: &dyn SessionStore, status: SessionStatus) -> SessionRecord {
    let mut subscription = store.subscribe();
    loop {
        if let Some(record) = store.read().await.unwrap() {
            if record.status == status {
                return record;
            }
        }
        tokio::time::timeout(std::time::Duration::from_secs(5), subscription.changed())
            .await
            .expect("timed out waiting for status")
            .expect("store closed");
    }
}

/// Memory store that keeps every committed snapshot in write order
///
/// A clear is recorded as `None`. Unlike a subscriber re-reading after a
/// notification, this sees each write exactly as it was committed.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    log: Mutex<Vec<Option<SessionRecord>>>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshots committed so far
    pub fn snapshots(&self) -> Vec<Option<SessionRecord>> {
        self.log.lock().unwrap().clone()
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

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
