//! Streaming accumulator
//!
//! Consumes a provider's delta stream and republishes the growing text to
//! the session store. Each write carries the full snapshot so far, never
//! just the delta, so a viewer that misses a notification still renders
//! the right text on the next one.
//!
//! Before every write the accumulator checks, inside the store's atomic
//! update, that the session it started with is still the one in the slot
//! and is still generating. If not, the stream has been superseded (by a
//! reset or a newer request) and the accumulator stops writing. The
//! provider call itself is not cancelled.

use crate::error::{Result, SuikouError};
use crate::history::placeholder_index;
use crate::providers::DeltaStream;
use crate::session::{SessionId, SessionPatch, SessionRecord, SessionStatus, Turn};
use crate::store::SessionStore;

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Which turn the stream is filling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorTarget {
    /// The answer to the proofreading request; mirrored into `result`
    Primary,
    /// The answer to a follow-up; fills the pending placeholder only
    FollowUp,
}

/// How often intermediate snapshots are written
///
/// The final write is never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WritePolicy {
    /// Minimum time between two intermediate writes (zero writes every delta)
    pub min_interval: Duration,
}

impl WritePolicy {
    /// One write per delta
    pub fn unthrottled() -> Self {
        Self::default()
    }

    /// Coalesce deltas arriving within `min_interval` of the last write
    pub fn throttled(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    fn allows(&self, last_write: Option<Instant>) -> bool {
        match last_write {
            None => true,
            Some(at) => self.min_interval.is_zero() || at.elapsed() >= self.min_interval,
        }
    }
}

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Stream ended normally and the final snapshot was written
    Completed {
        /// Full answer
        content: String,
    },
    /// Provider failed or timed out; the session is now `Error`
    Failed {
        /// Partial answer received before the failure
        content: String,
        /// Stored error message
        message: String,
    },
    /// The session was reset or replaced; nothing more was written
    Superseded {
        /// Text accumulated when the stream was abandoned
        content: String,
    },
}

impl StreamOutcome {
    /// Text accumulated so far
    pub fn content(&self) -> &str {
        match self {
            Self::Completed { content }
            | Self::Failed { content, .. }
            | Self::Superseded { content } => content,
        }
    }

    /// True for [`StreamOutcome::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Writes a delta stream into one session
pub struct Accumulator {
    store: Arc<dyn SessionStore>,
    session_id: SessionId,
    original_text: String,
    target: AccumulatorTarget,
    policy: WritePolicy,
    deadline: Option<(Instant, Duration)>,
}

impl Accumulator {
    /// Accumulator bound to `record`'s session
    pub fn new(
        store: Arc<dyn SessionStore>,
        record: &SessionRecord,
        target: AccumulatorTarget,
    ) -> Self {
        Self {
            store,
            session_id: record.id.clone(),
            original_text: record.original_text.clone(),
            target,
            policy: WritePolicy::default(),
            deadline: None,
        }
    }

    /// Use `policy` for intermediate writes
    pub fn with_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fail the session if the stream has not ended by `deadline`
    ///
    /// `timeout` is the configured duration, used for the error message.
    pub fn with_deadline(mut self, deadline: Instant, timeout: Duration) -> Self {
        self.deadline = Some((deadline, timeout));
        self
    }

    /// Drain `stream` into the store
    pub async fn run(&self, mut stream: DeltaStream) -> StreamOutcome {
        let mut content = String::new();
        let mut last_write: Option<Instant> = None;
        let mut deltas = 0usize;

        loop {
            let next = match self.deadline {
                Some((deadline, timeout)) => match timeout_at(deadline, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let message = SuikouError::Timeout {
                            seconds: timeout.as_secs(),
                        }
                        .to_string();
                        return self.fail(content, message).await;
                    }
                },
                None => stream.next().await,
            };

            let delta = match next {
                None => break,
                Some(Ok(delta)) => delta,
                Some(Err(e)) => return self.fail(content, e.to_string()).await,
            };

            if delta.is_empty() {
                continue;
            }
            content.push_str(&delta);
            deltas += 1;

            if !self.policy.allows(last_write) {
                continue;
            }
            match self.write_snapshot(&content).await {
                Ok(()) => last_write = Some(Instant::now()),
                Err(e) => return self.handle_write_error(content, e).await,
            }
        }

        tracing::debug!(
            "Stream for session {} ended after {} deltas",
            self.session_id,
            deltas
        );
        self.finish(content).await
    }

    /// Record a failure that happened before or instead of streaming
    ///
    /// Partial content is kept and any pending turn is settled.
    pub async fn fail(&self, content: String, message: String) -> StreamOutcome {
        let message = if message.trim().is_empty() {
            "Generation failed".to_string()
        } else {
            message
        };
        tracing::error!("Generation for session {} failed: {}", self.session_id, message);

        let result = self
            .store
            .update(Box::new(|current: Option<&SessionRecord>| {
                let record = self.ensure_current(current)?;
                let mut history = record.history.clone();
                match placeholder_index(&history) {
                    Some(index) => {
                        history[index].content = content.clone();
                        history[index].pending = false;
                    }
                    None if self.opens_primary_turn(record) && !content.is_empty() => {
                        history.push(Turn::assistant(content.clone()));
                    }
                    None => {}
                }
                let mut patch = SessionPatch::new()
                    .with_status(SessionStatus::Error)
                    .with_history(history)
                    .with_error(message.clone());
                if self.target == AccumulatorTarget::Primary && !content.is_empty() {
                    patch = patch.with_result(content.clone());
                }
                Ok(Some(patch))
            }))
            .await;

        match result {
            Ok(_) => StreamOutcome::Failed { content, message },
            Err(e) if is_superseded(&e) => self.abandon(content, &e),
            Err(e) => {
                tracing::error!(
                    "Could not record failure for session {}: {}",
                    self.session_id,
                    e
                );
                StreamOutcome::Failed { content, message }
            }
        }
    }

    async fn write_snapshot(&self, content: &str) -> Result<()> {
        self.store
            .update(Box::new(|current: Option<&SessionRecord>| {
                let record = self.ensure_current(current)?;
                let mut history = record.history.clone();
                match placeholder_index(&history) {
                    Some(index) => history[index].content = content.to_string(),
                    None if self.opens_primary_turn(record) => {
                        history.push(Turn::assistant_pending(content));
                    }
                    None => {
                        return Err(SuikouError::Superseded(
                            "no pending turn to fill".to_string(),
                        )
                        .into())
                    }
                }
                let mut patch = SessionPatch::new()
                    .with_status(SessionStatus::Streaming)
                    .with_history(history);
                if self.target == AccumulatorTarget::Primary {
                    patch = patch.with_result(content);
                }
                Ok(Some(patch))
            }))
            .await?;
        tracing::trace!("Snapshot for session {}: {} bytes", self.session_id, content.len());
        Ok(())
    }

    async fn finish(&self, content: String) -> StreamOutcome {
        let result = self
            .store
            .update(Box::new(|current: Option<&SessionRecord>| {
                let record = self.ensure_current(current)?;
                let mut history = record.history.clone();
                match placeholder_index(&history) {
                    Some(index) => {
                        history[index].content = content.clone();
                        history[index].pending = false;
                    }
                    None if self.opens_primary_turn(record) => {
                        history.push(Turn::assistant(content.clone()));
                    }
                    None => {
                        return Err(SuikouError::Superseded(
                            "no pending turn to settle".to_string(),
                        )
                        .into())
                    }
                }
                let mut patch = SessionPatch::new()
                    .with_status(SessionStatus::Complete)
                    .with_history(history)
                    .clear_error();
                if self.target == AccumulatorTarget::Primary {
                    patch = patch.with_result(content.clone());
                }
                Ok(Some(patch))
            }))
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Session {} complete", self.session_id);
                StreamOutcome::Completed { content }
            }
            Err(e) => self.handle_write_error(content, e).await,
        }
    }

    async fn handle_write_error(&self, content: String, error: anyhow::Error) -> StreamOutcome {
        if is_superseded(&error) {
            return self.abandon(content, &error);
        }
        self.fail(content, format!("Failed to store response: {}", error))
            .await
    }

    fn abandon(&self, content: String, error: &anyhow::Error) -> StreamOutcome {
        tracing::warn!("Abandoning stream for session {}: {}", self.session_id, error);
        StreamOutcome::Superseded { content }
    }

    /// The stored record, if it is still this stream's session and generating
    fn ensure_current<'r>(&self, current: Option<&'r SessionRecord>) -> Result<&'r SessionRecord> {
        let record = current
            .ok_or_else(|| SuikouError::Superseded("session was reset".to_string()))?;
        if !record.is_same_session(&self.session_id, &self.original_text) {
            return Err(SuikouError::Superseded(format!(
                "session {} replaced by {}",
                self.session_id, record.id
            ))
            .into());
        }
        if !record.status.is_in_flight() {
            return Err(SuikouError::Superseded(format!(
                "session {} is no longer generating ({})",
                self.session_id, record.status
            ))
            .into());
        }
        Ok(record)
    }

    /// True when the first delta of a primary answer may open its turn
    fn opens_primary_turn(&self, record: &SessionRecord) -> bool {
        self.target == AccumulatorTarget::Primary
            && record.status == SessionStatus::Loading
            && record.history.len() == 1
    }
}

fn is_superseded(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<SuikouError>(),
        Some(SuikouError::Superseded(_))
    )
}
