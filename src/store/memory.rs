//! In-memory session store

use super::{commit, ChangeKind, Notifier, SessionStore, Subscription, UpdateFn};
use crate::error::Result;
use crate::session::SessionRecord;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Session store that lives for the lifetime of the process
///
/// Used by tests and by the HTTP server when no durable store is wanted.
///
/// # Examples
///
/// ```
/// use suikou::session::{SessionPatch, SessionRecord};
/// use suikou::store::{MemoryStore, SessionStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// store.write(SessionPatch::replace(SessionRecord::new("hi"))).await.unwrap();
/// assert!(store.read().await.unwrap().is_some());
/// store.clear().await.unwrap();
/// assert!(store.read().await.unwrap().is_none());
/// # });
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    slot: RwLock<Option<SessionRecord>>,
    notifier: Notifier,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            notifier: Notifier::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn read(&self) -> Result<Option<SessionRecord>> {
        Ok(self.slot.read().await.clone())
    }

    async fn update(&self, f: UpdateFn<'_>) -> Result<Option<SessionRecord>> {
        let mut slot = self.slot.write().await;
        let patch = match f(slot.as_ref())? {
            Some(patch) => patch,
            None => return Ok(None),
        };
        let next = commit(slot.as_ref(), patch)?;
        *slot = Some(next.clone());
        self.notifier.notify(ChangeKind::Written);
        Ok(Some(next))
    }

    async fn clear(&self) -> Result<()> {
        let mut slot = self.slot.write().await;
        *slot = None;
        self.notifier.notify(ChangeKind::Cleared);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }
}
