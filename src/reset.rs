//! Reset trigger
//!
//! Navigation or a reload of the page the text came from ends the
//! session. The trigger clears the store unconditionally; streams that
//! are still running notice on their next write and stop. The provider
//! call is not cancelled.

use crate::error::Result;
use crate::store::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Load status reported for the originating page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Page is loading (navigation or reload)
    Loading,
    /// Page finished loading
    Complete,
}

/// Events the trigger reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResetEvent {
    /// The originating page changed load status
    PageUpdated {
        /// New status
        status: PageStatus,
    },
    /// Explicit reset requested by the user
    Manual,
}

/// Clears the session when a qualifying event arrives
#[derive(Clone)]
pub struct ResetTrigger {
    store: Arc<dyn SessionStore>,
}

impl ResetTrigger {
    /// Trigger bound to `store`
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// True if `event` ends the session
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::reset::{PageStatus, ResetEvent, ResetTrigger};
    ///
    /// assert!(ResetTrigger::qualifies(&ResetEvent::PageUpdated { status: PageStatus::Loading }));
    /// assert!(!ResetTrigger::qualifies(&ResetEvent::PageUpdated { status: PageStatus::Complete }));
    /// assert!(ResetTrigger::qualifies(&ResetEvent::Manual));
    /// ```
    pub fn qualifies(event: &ResetEvent) -> bool {
        match event {
            ResetEvent::PageUpdated { status } => *status == PageStatus::Loading,
            ResetEvent::Manual => true,
        }
    }

    /// Handle `event`, clearing the store if it qualifies
    ///
    /// Returns whether the store was cleared.
    ///
    /// # Errors
    ///
    /// Returns the store's error if clearing fails
    pub async fn on_event(&self, event: ResetEvent) -> Result<bool> {
        if !Self::qualifies(&event) {
            tracing::trace!("Ignoring {:?}", event);
            return Ok(false);
        }
        self.reset().await?;
        Ok(true)
    }

    /// Clear the store unconditionally
    ///
    /// # Errors
    ///
    /// Returns the store's error if clearing fails
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await?;
        tracing::info!("Session reset");
        Ok(())
    }
}
