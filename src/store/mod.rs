//! Shared session store
//!
//! The store holds at most one [`SessionRecord`]. Producer and viewer
//! never share memory; they meet here. Writes are whole-field
//! replacements validated against the session state machine, and every
//! successful write or clear is announced to subscribers with a
//! payload-free [`StoreEvent`]. Listeners re-read the record.
//!
//! Read-check-write sequences go through [`SessionStore::update`], which
//! runs the caller's closure against the latest record and commits the
//! returned patch as one atomic step with respect to other writers.

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, SuikouError};
use crate::session::{now_millis, validate_write, SessionPatch, SessionRecord};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Buffered notifications per subscriber before it is reported as lagging
const NOTIFY_CAPACITY: usize = 64;

/// Closure passed to [`SessionStore::update`]
///
/// Receives the latest record. `Ok(Some(patch))` commits the patch,
/// `Ok(None)` declines without writing, and an error aborts the update
/// and is returned to the caller unchanged.
pub type UpdateFn<'a> =
    Box<dyn FnOnce(Option<&SessionRecord>) -> Result<Option<SessionPatch>> + Send + 'a>;

/// What happened to the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record was written
    Written,
    /// The slot was cleared
    Cleared,
    /// The subscriber fell behind and `skipped` notifications were dropped
    Missed {
        /// Number of notifications that were never delivered
        skipped: u64,
    },
}

/// Change notification
///
/// Carries no record; listeners call [`SessionStore::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    /// Store-wide counter, incremented on every write and clear
    pub revision: u64,
    /// Kind of change
    pub kind: ChangeKind,
}

/// A live subscription
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<StoreEvent>,
    last_revision: u64,
}

impl Subscription {
    fn new(rx: broadcast::Receiver<StoreEvent>, last_revision: u64) -> Self {
        Self { rx, last_revision }
    }

    /// Wait for the next change
    ///
    /// A subscriber that falls behind receives a single
    /// [`ChangeKind::Missed`] event instead of the dropped ones, so it is
    /// still told that something changed. Returns `None` once the store
    /// has been dropped.
    pub async fn changed(&mut self) -> Option<StoreEvent> {
        match self.rx.recv().await {
            Ok(event) => {
                self.last_revision = event.revision;
                Some(event)
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Some(missed(&mut self.last_revision, skipped))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Turn the subscription into a stream of events
    ///
    /// Events carry the same revisions [`Subscription::changed`] would
    /// report.
    pub fn into_stream(self) -> impl Stream<Item = StoreEvent> + Send + 'static {
        let mut last_revision = self.last_revision;
        BroadcastStream::new(self.rx).map(move |item| match item {
            Ok(event) => {
                last_revision = event.revision;
                event
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => missed(&mut last_revision, skipped),
        })
    }
}

/// Collapse `skipped` dropped notifications into one event
fn missed(last_revision: &mut u64, skipped: u64) -> StoreEvent {
    *last_revision += skipped;
    StoreEvent {
        revision: *last_revision,
        kind: ChangeKind::Missed { skipped },
    }
}

/// The single shared session slot
///
/// Implementations must make each `update` atomic with respect to other
/// writers and notify subscribers after every successful write or clear.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current record, if any
    async fn read(&self) -> Result<Option<SessionRecord>>;

    /// Atomically read the latest record, decide, and write
    ///
    /// Returns the committed record, or `None` when the closure declined.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, an invariant or transition error if
    /// the resulting record is illegal, or a storage error. Nothing is
    /// written and nobody is notified in any of those cases.
    async fn update(&self, f: UpdateFn<'_>) -> Result<Option<SessionRecord>>;

    /// Remove the record unconditionally and notify subscribers
    ///
    /// Subscribers are notified even if the slot was already empty.
    async fn clear(&self) -> Result<()>;

    /// Register for change notifications
    fn subscribe(&self) -> Subscription;

    /// Write a partial record
    ///
    /// Every field present in `patch` replaces the stored value. A patch
    /// with a new `id` replaces the whole record.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::update`].
    async fn write(&self, patch: SessionPatch) -> Result<SessionRecord> {
        self.update(Box::new(move |_| Ok(Some(patch))))
            .await?
            .ok_or_else(|| SuikouError::Storage("write was not committed".to_string()).into())
    }
}

/// Build and validate the record that `patch` produces over `previous`
///
/// Timestamps never decrease, even if the wall clock steps backwards.
pub(crate) fn commit(
    previous: Option<&SessionRecord>,
    patch: SessionPatch,
) -> Result<SessionRecord> {
    let timestamp = previous.map_or(now_millis(), |prev| now_millis().max(prev.timestamp));

    let next = match previous {
        Some(prev) if patch.id.as_ref().map_or(true, |id| *id == prev.id) => {
            prev.apply(patch, timestamp)
        }
        _ => SessionRecord::from_patch(patch, timestamp)?,
    };

    validate_write(previous, &next)?;
    Ok(next)
}

/// Broadcast half shared by the store backends
#[derive(Debug)]
pub(crate) struct Notifier {
    tx: broadcast::Sender<StoreEvent>,
    revision: AtomicU64,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            tx,
            revision: AtomicU64::new(0),
        }
    }

    pub(crate) fn notify(&self, kind: ChangeKind) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        // No receivers is fine: nobody is watching yet.
        let _ = self.tx.send(StoreEvent { revision, kind });
        tracing::trace!("Store revision {} ({:?})", revision, kind);
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        let rx = self.tx.subscribe();
        Subscription::new(rx, self.revision.load(Ordering::SeqCst))
    }
}

/// Open the store selected by `config`
///
/// # Errors
///
/// Returns `SuikouError::Storage` if the durable store cannot be opened
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::debug!("Using in-memory session store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sled => {
            let store = match &config.path {
                Some(path) => SledStore::open(path)?,
                None => SledStore::open_default()?,
            };
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    #[test]
    fn test_commit_new_session_requires_loading() {
        let record = SessionRecord::new("text");
        let committed = commit(None, SessionPatch::replace(record.clone())).unwrap();
        assert_eq!(committed.id, record.id);

        let mut bad = SessionRecord::new("text");
        bad.status = SessionStatus::Complete;
        assert!(commit(None, SessionPatch::replace(bad)).is_err());
    }

    #[test]
    fn test_commit_partial_on_empty_slot_fails() {
        let patch = SessionPatch::new().with_status(SessionStatus::Streaming);
        let err = commit(None, patch).unwrap_err();
        assert!(err.to_string().contains("missing required field"));
    }

    #[test]
    fn test_commit_timestamp_never_decreases() {
        let mut prev = SessionRecord::new("text");
        prev.timestamp = i64::MAX - 1;
        let next = commit(
            Some(&prev),
            SessionPatch::new()
                .with_status(SessionStatus::Streaming)
                .with_result("a"),
        )
        .unwrap();
        assert_eq!(next.timestamp, prev.timestamp);
    }

    #[test]
    fn test_commit_other_id_replaces_wholesale() {
        let prev = SessionRecord::new("one");
        let patch = SessionPatch::replace(SessionRecord::new("two"));
        let next = commit(Some(&prev), patch).unwrap();
        assert_eq!(next.original_text, "two");
        assert_ne!(next.id, prev.id);
    }

    #[tokio::test]
    async fn test_subscription_reports_missed_events() {
        let notifier = Notifier::new();
        let mut sub = notifier.subscribe();
        for _ in 0..(NOTIFY_CAPACITY + 5) {
            notifier.notify(ChangeKind::Written);
        }
        let event = sub.changed().await.unwrap();
        assert!(matches!(event.kind, ChangeKind::Missed { skipped } if skipped > 0));
        let next = sub.changed().await.unwrap();
        assert_eq!(next.kind, ChangeKind::Written);
    }

    #[tokio::test]
    async fn test_lagged_revisions_match_between_changed_and_stream() {
        let notifier = Notifier::new();
        notifier.notify(ChangeKind::Written);
        notifier.notify(ChangeKind::Written);

        let mut sub = notifier.subscribe();
        let stream_sub = notifier.subscribe();
        for _ in 0..(NOTIFY_CAPACITY + 5) {
            notifier.notify(ChangeKind::Written);
        }

        let mut stream = Box::pin(stream_sub.into_stream());
        for _ in 0..2 {
            let from_changed = sub.changed().await.unwrap();
            let from_stream = stream.next().await.unwrap();
            assert_eq!(from_changed, from_stream);
        }
    }

    #[tokio::test]
    async fn test_missed_event_continues_store_revision() {
        let notifier = Notifier::new();
        notifier.notify(ChangeKind::Written);
        let sub = notifier.subscribe();
        for _ in 0..(NOTIFY_CAPACITY + 5) {
            notifier.notify(ChangeKind::Written);
        }

        let mut stream = Box::pin(sub.into_stream());
        let first = stream.next().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Missed { skipped: 5 });
        assert_eq!(first.revision, 1 + 5);
        let second = stream.next().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Written);
        assert_eq!(second.revision, first.revision + 1);
    }

    #[tokio::test]
    async fn test_subscription_closed_when_notifier_dropped() {
        let notifier = Notifier::new();
        let mut sub = notifier.subscribe();
        drop(notifier);
        assert!(sub.changed().await.is_none());
    }
}
