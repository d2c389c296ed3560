//! Durable session store on `sled`
//!
//! The record lives under a single key as JSON, so the database can be
//! inspected with any sled tooling and survives restarts of the process
//! that wrote it.

use super::{commit, ChangeKind, Notifier, SessionStore, Subscription, UpdateFn};
use crate::error::{Result, SuikouError};
use crate::session::SessionRecord;

use async_trait::async_trait;
use directories::ProjectDirs;
use sled::Db;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const SESSION_KEY: &[u8] = b"session";

/// Session store persisted in an embedded `sled` database
pub struct SledStore {
    db: Db,
    // Serializes read-modify-write cycles so each update is atomic.
    gate: Mutex<()>,
    notifier: Notifier,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish_non_exhaustive()
    }
}

impl SledStore {
    /// Open or create a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `SuikouError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::store::SledStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SledStore::open(dir.path().join("session.db")).unwrap();
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            SuikouError::Storage(format!(
                "Failed to open session database {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!("Opened session store at {}", path.display());
        Ok(Self {
            db,
            gate: Mutex::new(()),
            notifier: Notifier::new(),
        })
    }

    /// Open the store in the user's data directory
    ///
    /// # Errors
    ///
    /// Returns `SuikouError::Storage` if the data directory cannot be
    /// determined or created, or the database cannot be opened
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Default database location (`<data dir>/session.db`)
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "suikou", "suikou")
            .ok_or_else(|| SuikouError::Storage("Could not determine data directory".into()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(|e| {
            SuikouError::Storage(format!("Failed to create data directory: {}", e))
        })?;
        Ok(data_dir.join("session.db"))
    }

    fn load(&self) -> Result<Option<SessionRecord>> {
        match self
            .db
            .get(SESSION_KEY)
            .map_err(|e| SuikouError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    SuikouError::Storage(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| SuikouError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Announce a change that sled has already applied
    ///
    /// Readers see the change as soon as sled applies it, so subscribers
    /// are notified even when the flush to disk failed.
    fn publish(&self, kind: ChangeKind, flushed: Result<()>) {
        if let Err(e) = flushed {
            tracing::warn!("Session store change not yet on disk: {}", e);
        }
        self.notifier.notify(kind);
    }
}

#[async_trait]
impl SessionStore for SledStore {
    async fn read(&self) -> Result<Option<SessionRecord>> {
        self.load()
    }

    async fn update(&self, f: UpdateFn<'_>) -> Result<Option<SessionRecord>> {
        let _gate = self.gate.lock().await;
        let previous = self.load()?;
        let patch = match f(previous.as_ref())? {
            Some(patch) => patch,
            None => return Ok(None),
        };
        let next = commit(previous.as_ref(), patch)?;

        let value = serde_json::to_vec(&next)
            .map_err(|e| SuikouError::Storage(format!("Serialization failed: {}", e)))?;
        self.db
            .insert(SESSION_KEY, value)
            .map_err(|e| SuikouError::Storage(format!("Insert failed: {}", e)))?;
        let flushed = self.flush().await;
        self.publish(ChangeKind::Written, flushed);
        Ok(Some(next))
    }

    async fn clear(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.db
            .remove(SESSION_KEY)
            .map_err(|e| SuikouError::Storage(format!("Remove failed: {}", e)))?;
        let flushed = self.flush().await;
        self.publish(ChangeKind::Cleared, flushed);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }
}
