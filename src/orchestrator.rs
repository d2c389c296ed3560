//! Request orchestrator
//!
//! Producer-side controller. It validates a request, opens the session
//! (or appends the follow-up turns) in one atomic store update, calls the
//! provider, and hands the resulting stream to an [`Accumulator`].
//!
//! Each request is split in two halves so a caller can answer quickly and
//! let generation run in the background: `begin_*` does every check and
//! the first write, and [`Orchestrator::complete`] drives the provider.
//! Provider failures never surface as errors from `complete`; they end up
//! in the session as the `Error` state.

use crate::config::Config;
use crate::error::{Result, SuikouError};
use crate::history::{append_follow_up, follow_up_messages, proofreading_messages};
use crate::providers::{GenerationOptions, Message, Provider};
use crate::session::{
    transition, SessionEvent, SessionPatch, SessionRecord, SessionStatus, Turn,
};
use crate::store::SessionStore;
use crate::stream::{Accumulator, AccumulatorTarget, StreamOutcome, WritePolicy};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Default generation timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A request that passed validation and has been written to the store
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Session as written by the opening update
    pub record: SessionRecord,
    /// Messages to send to the provider
    pub messages: Vec<Message>,
    /// Which turn the answer fills
    pub target: AccumulatorTarget,
}

/// Sequences session writes, provider calls, and streaming
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use suikou::config::OllamaConfig;
/// use suikou::orchestrator::Orchestrator;
/// use suikou::providers::OllamaProvider;
/// use suikou::store::MemoryStore;
///
/// # async fn example() -> suikou::error::Result<()> {
/// let store = Arc::new(MemoryStore::new());
/// let provider = Arc::new(OllamaProvider::new(OllamaConfig::default())?);
/// let orchestrator = Orchestrator::new(store, provider);
/// orchestrator.start_proofreading("Their going to the park tomorow.").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    options: GenerationOptions,
    timeout: Duration,
    policy: WritePolicy,
}

impl Orchestrator {
    /// Orchestrator with default options, a 60 second timeout, and
    /// unthrottled writes
    pub fn new(store: Arc<dyn SessionStore>, provider: Arc<dyn Provider>) -> Self {
        Self {
            store,
            provider,
            options: GenerationOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            policy: WritePolicy::unthrottled(),
        }
    }

    /// Orchestrator configured from the `generation` and `streaming` sections
    pub fn from_config(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        config: &Config,
    ) -> Self {
        Self::new(store, provider)
            .with_options(config.generation.options())
            .with_timeout(config.generation.timeout())
            .with_write_policy(config.streaming.write_policy())
    }

    /// Set generation options
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the generation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the streaming write policy
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The session store this orchestrator writes to
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// The provider this orchestrator calls
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Options sent with every generation request
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// How long a provider call may take
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Proofread `text` and wait for the answer
    ///
    /// Any previous session is replaced. A provider failure or timeout is
    /// recorded as the session's `Error` state and reported through the
    /// returned outcome, not as an error.
    ///
    /// # Errors
    ///
    /// - `SuikouError::Validation` if `text` is empty (nothing is written)
    /// - store errors from the opening writes
    pub async fn start_proofreading(&self, text: &str) -> Result<StreamOutcome> {
        let request = self.begin_proofreading(text).await?;
        Ok(self.complete(request).await)
    }

    /// Validate `text`, clear the slot, and write the new `Loading` session
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::start_proofreading`]
    pub async fn begin_proofreading(&self, text: &str) -> Result<PendingRequest> {
        if text.trim().is_empty() {
            tracing::warn!("Rejected proofreading request with empty text");
            return Err(SuikouError::Validation("text to proofread is empty".to_string()).into());
        }

        self.store.clear().await?;
        let record = self
            .store
            .write(SessionPatch::replace(SessionRecord::new(text)))
            .await?;

        tracing::info!(
            "Started session {} ({} chars)",
            record.id,
            record.original_text.chars().count()
        );

        Ok(PendingRequest {
            messages: proofreading_messages(&record.original_text),
            record,
            target: AccumulatorTarget::Primary,
        })
    }

    /// Send a follow-up message and wait for the answer
    ///
    /// `current_history` is the history the caller last rendered. The
    /// stored history is authoritative; a stale copy is only logged.
    ///
    /// Returns the assistant turn as it was left when the stream ended
    /// (complete, partial on failure, or whatever was received before the
    /// session was superseded).
    ///
    /// # Errors
    ///
    /// - `SuikouError::Validation` if `message` is empty
    /// - `SuikouError::ConcurrentRequest` while a generation is in flight
    /// - `SuikouError::NoActiveSession` if the store is empty
    /// - `SuikouError::Superseded` if `original_text` no longer matches
    pub async fn send_follow_up(
        &self,
        message: &str,
        current_history: &[Turn],
        original_text: &str,
    ) -> Result<Turn> {
        let request = self
            .begin_follow_up(message, current_history, original_text)
            .await?;
        let outcome = self.complete(request).await;
        Ok(Turn::assistant(outcome.content()))
    }

    /// Check the follow-up and append its turns in one atomic update
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::send_follow_up`]
    pub async fn begin_follow_up(
        &self,
        message: &str,
        current_history: &[Turn],
        original_text: &str,
    ) -> Result<PendingRequest> {
        if message.trim().is_empty() {
            tracing::warn!("Rejected empty follow-up message");
            return Err(SuikouError::Validation("follow-up message is empty".to_string()).into());
        }

        let record = self
            .store
            .update(Box::new(|current: Option<&SessionRecord>| {
                let record = current.ok_or(SuikouError::NoActiveSession)?;
                if record.original_text != original_text {
                    return Err(SuikouError::Superseded(
                        "the session now belongs to a different text".to_string(),
                    )
                    .into());
                }
                let status = transition(record.status, SessionEvent::FollowUp)?;
                if current_history != record.history.as_slice() {
                    tracing::warn!(
                        "Follow-up for session {} sent from a stale history ({} turns, stored {})",
                        record.id,
                        current_history.len(),
                        record.history.len()
                    );
                }
                Ok(Some(
                    SessionPatch::new()
                        .with_status(status)
                        .with_history(append_follow_up(&record.history, message))
                        .clear_error(),
                ))
            }))
            .await
            .map_err(|e| {
                if let Some(SuikouError::ConcurrentRequest { status }) =
                    e.downcast_ref::<SuikouError>()
                {
                    tracing::warn!("Rejected follow-up while session is {}", status);
                }
                e
            })?
            .ok_or_else(|| SuikouError::Storage("follow-up was not committed".to_string()))?;

        debug_assert_eq!(record.status, SessionStatus::Streaming);
        let prior = &record.history[..record.history.len().saturating_sub(2)];
        let messages = follow_up_messages(prior, &record.original_text, message);

        tracing::info!(
            "Follow-up on session {} ({} prior turns)",
            record.id,
            prior.len().saturating_sub(1)
        );

        Ok(PendingRequest {
            record,
            messages,
            target: AccumulatorTarget::FollowUp,
        })
    }

    /// Call the provider for `request` and stream the answer into the store
    pub async fn complete(&self, request: PendingRequest) -> StreamOutcome {
        // A timeout too large to represent as an instant means no deadline.
        let deadline = Instant::now().checked_add(self.timeout);
        let mut accumulator =
            Accumulator::new(self.store.clone(), &request.record, request.target)
                .with_policy(self.policy);
        if let Some(deadline) = deadline {
            accumulator = accumulator.with_deadline(deadline, self.timeout);
        }

        tracing::debug!(
            "Calling provider {} with {} messages",
            self.provider.name(),
            request.messages.len()
        );

        let call = self.provider.generate(&request.messages, &self.options);
        let generation = match deadline {
            Some(deadline) => timeout_at(deadline, call).await,
            None => Ok(call.await),
        };

        match generation {
            Ok(Ok(generation)) => accumulator.run(generation.into_stream()).await,
            Ok(Err(e)) => accumulator.fail(String::new(), e.to_string()).await,
            Err(_) => {
                let message = SuikouError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
                .to_string();
                accumulator.fail(String::new(), message).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::history::{bootstrap_turn, project};
    use crate::prompts::{CHAT_SYSTEM_PROMPT, PROOFREAD_SYSTEM_PROMPT};
    use crate::store::MemoryStore;
    use crate::test_utils::{RecordingStore, Script, ScriptedProvider};

    fn orchestrator(scripts: Vec<Script>) -> (Orchestrator, Arc<RecordingStore>, Arc<ScriptedProvider>) {
        let store = Arc::new(RecordingStore::new());
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let orch = Orchestrator::new(store.clone(), provider.clone());
        (orch, store, provider)
    }

    #[tokio::test]
    async fn test_start_proofreading_sends_bootstrap_prompt() {
        let (orch, _, provider) = orchestrator(vec![Script::deltas(&["ok"])]);
        orch.start_proofreading("teh cat").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0], Message::system(PROOFREAD_SYSTEM_PROMPT));
        assert_eq!(requests[0][1], Message::from(&bootstrap_turn("teh cat")));
    }

    #[tokio::test]
    async fn test_start_proofreading_clears_then_opens_loading() {
        let (orch, store, _) = orchestrator(vec![Script::deltas(&["a"])]);
        orch.start_proofreading("text").await.unwrap();

        let log = store.take();
        assert!(log[0].is_none());
        let opened = log[1].as_ref().unwrap();
        assert_eq!(opened.status, SessionStatus::Loading);
        assert_eq!(opened.history, vec![bootstrap_turn("text")]);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_writes() {
        let (orch, store, provider) = orchestrator(vec![]);
        for text in ["", "   \n\t"] {
            let err = orch.start_proofreading(text).await.unwrap_err();
            assert_eq!(SuikouError::kind_of(&err), ErrorKind::Validation);
        }
        assert!(store.take().is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_provider_rejection_becomes_error_state() {
        let (orch, store, _) = orchestrator(vec![Script::Reject("model not found".into())]);
        let outcome = orch.start_proofreading("text").await.unwrap();
        assert!(matches!(outcome, StreamOutcome::Failed { .. }));

        let record = store.read().await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Error);
        assert!(record.error_message.as_deref().unwrap().contains("model not found"));
        assert_eq!(record.history.len(), 1);
    }

    #[tokio::test]
    async fn test_follow_up_round_trip() {
        let (orch, store, provider) = orchestrator(vec![
            Script::deltas(&["Formal text"]),
            Script::deltas(&["Because ", "it reads better."]),
        ]);
        orch.start_proofreading("orig").await.unwrap();
        let history = store.read().await.unwrap().unwrap().history;

        let turn = orch
            .send_follow_up("Why?", &history, "orig")
            .await
            .unwrap();
        assert_eq!(turn, Turn::assistant("Because it reads better."));

        let record = store.read().await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Complete);
        assert_eq!(record.result.as_deref(), Some("Formal text"));
        assert_eq!(
            project(&record.history),
            &[
                Turn::assistant("Formal text"),
                Turn::user("Why?"),
                Turn::assistant("Because it reads better."),
            ]
        );

        let follow_up = &provider.requests()[1];
        assert_eq!(follow_up[0], Message::system(CHAT_SYSTEM_PROMPT));
        assert_eq!(follow_up[1], Message::user("Original text: orig"));
        assert_eq!(follow_up[2], Message::assistant("Formal text"));
        assert_eq!(follow_up[3], Message::user("Why?"));
        assert_eq!(follow_up.len(), 4);
    }

    #[tokio::test]
    async fn test_follow_up_appends_placeholder_before_provider_call() {
        let (orch, store, _) = orchestrator(vec![
            Script::deltas(&["A"]),
            Script::deltas(&["B"]),
        ]);
        orch.start_proofreading("orig").await.unwrap();
        store.take();
        let history = store.read().await.unwrap().unwrap().history;
        orch.send_follow_up("more?", &history, "orig").await.unwrap();

        let first = store.take().remove(0).unwrap();
        assert_eq!(first.status, SessionStatus::Streaming);
        assert_eq!(first.history.len(), 4);
        assert!(first.history[3].is_placeholder());
        assert!(first.history[3].content.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_after_error_is_allowed() {
        let (orch, store, _) = orchestrator(vec![
            Script::Reject("down".into()),
            Script::deltas(&["back"]),
        ]);
        orch.start_proofreading("orig").await.unwrap();
        let history = store.read().await.unwrap().unwrap().history;
        orch.send_follow_up("retry?", &history, "orig").await.unwrap();

        let record = store.read().await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Complete);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_follow_up_validation_and_missing_session() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let orch = Orchestrator::new(store, Arc::new(ScriptedProvider::new([])));

        let err = orch.send_follow_up(" ", &[], "orig").await.unwrap_err();
        assert_eq!(SuikouError::kind_of(&err), ErrorKind::Validation);

        let err = orch.send_follow_up("hi", &[], "orig").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SuikouError>(),
            Some(SuikouError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_follow_up_for_other_text_is_superseded() {
        let (orch, store, _) = orchestrator(vec![Script::deltas(&["A"])]);
        orch.start_proofreading("current").await.unwrap();
        let history = store.read().await.unwrap().unwrap().history;
        let err = orch
            .send_follow_up("hi", &history, "old text")
            .await
            .unwrap_err();
        assert_eq!(SuikouError::kind_of(&err), ErrorKind::Superseded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_provider_times_out_once() {
        let (orch, store, _) = orchestrator(vec![Script::Stall]);
        let orch = orch.with_timeout(Duration::from_secs(3));
        orch.start_proofreading("text").await.unwrap();

        let writes: Vec<SessionRecord> = store.take().into_iter().flatten().collect();
        assert_eq!(writes.len(), 2);
        let last = &writes[1];
        assert_eq!(last.status, SessionStatus::Error);
        assert!(last.error_message.as_deref().unwrap().contains("timed out"));
        assert_eq!(last.history, vec![bootstrap_turn("text")]);
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_runs_without_deadline() {
        let (orch, store, _) = orchestrator(vec![Script::deltas(&["fine"])]);
        let orch = orch.with_timeout(Duration::MAX);
        let outcome = orch.start_proofreading("text").await.unwrap();
        assert!(outcome.is_completed());

        let record = store.read().await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Complete);
        assert_eq!(record.result.as_deref(), Some("fine"));
    }
}
