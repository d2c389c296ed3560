//! Session record types
//!
//! [`SessionRecord`] is serialized with camelCase field names so the
//! same JSON is read by the durable store, the HTTP surface, and any
//! out-of-process viewer.

use crate::error::{Result, SuikouError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique identity of one top-level proofreading session
///
/// A new id is minted for every `start`, so a stale stream can tell that
/// the slot now belongs to someone else even when the text is identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new sortable session id (ULID)
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::session::SessionId;
    ///
    /// let a = SessionId::new();
    /// let b = SessionId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session (the store is empty)
    #[default]
    Idle,
    /// Request accepted, no delta received yet
    Loading,
    /// At least one delta received for the current turn
    Streaming,
    /// Current turn finished successfully
    Complete,
    /// Current request failed
    Error,
}

impl SessionStatus {
    /// True while a generation is in flight
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Loading | Self::Streaming)
    }

    /// True for `Complete` and `Error`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking for the rewrite
    User,
    /// The AI
    Assistant,
}

impl Role {
    /// Role name as sent to providers
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who wrote it
    pub role: Role,
    /// Text so far (may be empty while streaming)
    pub content: String,
    /// True while the content is still being generated
    #[serde(default)]
    pub pending: bool,
}

impl Turn {
    /// Confirmed user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            pending: false,
        }
    }

    /// Confirmed assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            pending: false,
        }
    }

    /// Assistant turn still being generated
    pub fn assistant_pending(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            pending: true,
        }
    }

    /// Empty assistant turn shown while a follow-up is waiting for its first delta
    pub fn placeholder() -> Self {
        Self::assistant_pending(String::new())
    }

    /// True for a pending assistant turn
    pub fn is_placeholder(&self) -> bool {
        self.pending && self.role == Role::Assistant
    }
}

/// The single shared session slot
///
/// # Examples
///
/// ```
/// use suikou::session::{SessionRecord, SessionStatus};
///
/// let record = SessionRecord::new("Hello world");
/// assert_eq!(record.status, SessionStatus::Loading);
/// assert_eq!(record.history.len(), 1);
/// assert!(record.history[0].content.contains("Hello world"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session identity
    pub id: SessionId,
    /// The selected text; never changes for the life of the session
    pub original_text: String,
    /// Milliseconds since the Unix epoch of the last write
    pub timestamp: i64,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Latest (partial or complete) assistant answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Conversation so far; `history[0]` is the bootstrap turn
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Failure description, set only in `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SessionRecord {
    /// Fresh `Loading` record with the bootstrap turn for `original_text`
    pub fn new(original_text: impl Into<String>) -> Self {
        let original_text = original_text.into();
        let bootstrap = crate::history::bootstrap_turn(&original_text);
        Self {
            id: SessionId::new(),
            original_text,
            timestamp: now_millis(),
            status: SessionStatus::Loading,
            result: None,
            history: vec![bootstrap],
            error_message: None,
        }
    }

    /// Build a record from a patch that carries every required field
    ///
    /// Used when a write lands on an empty slot or replaces another
    /// session wholesale.
    ///
    /// # Errors
    ///
    /// Returns `SuikouError::InvariantViolation` if `id`, `original_text`,
    /// `status`, or `history` is missing from the patch.
    pub fn from_patch(patch: SessionPatch, timestamp: i64) -> Result<Self> {
        let missing = |field: &str| {
            SuikouError::InvariantViolation(format!(
                "new session write is missing required field `{}`",
                field
            ))
        };

        Ok(Self {
            id: patch.id.ok_or_else(|| missing("id"))?,
            original_text: patch.original_text.ok_or_else(|| missing("originalText"))?,
            timestamp,
            status: patch.status.ok_or_else(|| missing("status"))?,
            result: patch.result.flatten(),
            history: patch.history.ok_or_else(|| missing("history"))?,
            error_message: patch.error_message.flatten(),
        })
    }

    /// Return a copy with every field present in `patch` replaced
    ///
    /// Arrays are replaced whole; nothing is merged.
    pub fn apply(&self, patch: SessionPatch, timestamp: i64) -> Self {
        let mut next = self.clone();
        if let Some(id) = patch.id {
            next.id = id;
        }
        if let Some(original_text) = patch.original_text {
            next.original_text = original_text;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(result) = patch.result {
            next.result = result;
        }
        if let Some(history) = patch.history {
            next.history = history;
        }
        if let Some(error_message) = patch.error_message {
            next.error_message = error_message;
        }
        next.timestamp = timestamp;
        next
    }

    /// Number of turns with `pending = true`
    pub fn pending_count(&self) -> usize {
        self.history.iter().filter(|turn| turn.pending).count()
    }

    /// The last turn if it is a pending assistant placeholder
    pub fn placeholder(&self) -> Option<&Turn> {
        self.history.last().filter(|turn| turn.is_placeholder())
    }

    /// True when `other` describes the same session (id and text)
    pub fn is_same_session(&self, id: &SessionId, original_text: &str) -> bool {
        &self.id == id && self.original_text == original_text
    }
}

/// A partial session record (`Partial<SessionRecord>`)
///
/// Every `Some` field replaces the stored value on write. The nested
/// options on `result` and `error_message` distinguish "leave as is"
/// (`None`) from "clear" (`Some(None)`).
///
/// # Examples
///
/// ```
/// use suikou::session::{SessionPatch, SessionStatus};
///
/// let patch = SessionPatch::new()
///     .with_status(SessionStatus::Streaming)
///     .with_result("Hel");
/// assert_eq!(patch.status, Some(SessionStatus::Streaming));
/// assert_eq!(patch.result, Some(Some("Hel".to_string())));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    /// Session identity; a different id replaces the slot wholesale
    pub id: Option<SessionId>,
    /// Original text
    pub original_text: Option<String>,
    /// Status
    pub status: Option<SessionStatus>,
    /// Result (`Some(None)` clears it)
    pub result: Option<Option<String>>,
    /// Whole history
    pub history: Option<Vec<Turn>>,
    /// Error message (`Some(None)` clears it)
    pub error_message: Option<Option<String>>,
}

impl SessionPatch {
    /// Empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch carrying every field of `record`
    pub fn replace(record: SessionRecord) -> Self {
        Self {
            id: Some(record.id),
            original_text: Some(record.original_text),
            status: Some(record.status),
            result: Some(record.result),
            history: Some(record.history),
            error_message: Some(record.error_message),
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the result
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(Some(result.into()));
        self
    }

    /// Replace the history
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set the error message
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    /// Clear the error message
    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
    }

    #[test]
    fn test_status_in_flight_and_terminal() {
        assert!(SessionStatus::Loading.is_in_flight());
        assert!(SessionStatus::Streaming.is_in_flight());
        assert!(!SessionStatus::Complete.is_in_flight());
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Idle.is_terminal());
    }

    #[test]
    fn test_record_uses_camel_case_fields() {
        let mut record = SessionRecord::new("text");
        record.error_message = Some("boom".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("originalText").is_some());
        assert!(json.get("errorMessage").is_some());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_from_patch_requires_fields() {
        let patch = SessionPatch::new().with_status(SessionStatus::Loading);
        let err = SessionRecord::from_patch(patch, 1).unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_apply_replaces_only_present_fields() {
        let record = SessionRecord::new("text");
        let next = record.apply(
            SessionPatch::new()
                .with_status(SessionStatus::Streaming)
                .with_result("abc"),
            record.timestamp + 5,
        );
        assert_eq!(next.status, SessionStatus::Streaming);
        assert_eq!(next.result.as_deref(), Some("abc"));
        assert_eq!(next.history, record.history);
        assert_eq!(next.id, record.id);
        assert_eq!(next.timestamp, record.timestamp + 5);
    }

    #[test]
    fn test_apply_can_clear_error() {
        let mut record = SessionRecord::new("text");
        record.error_message = Some("boom".to_string());
        let next = record.apply(SessionPatch::new().clear_error(), 0);
        assert!(next.error_message.is_none());
    }

    #[test]
    fn test_placeholder_detection() {
        let mut record = SessionRecord::new("text");
        assert!(record.placeholder().is_none());
        record.history.push(Turn::user("why?"));
        record.history.push(Turn::placeholder());
        assert!(record.placeholder().is_some());
        assert_eq!(record.pending_count(), 1);
    }
}
