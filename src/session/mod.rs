//! Shared session record and its state machine
//!
//! The session record is the single slot the Producer writes and the
//! Viewer renders. [`state`] holds the legal transitions and the
//! invariant checks every store write goes through.

pub mod record;
pub mod state;

pub use record::{now_millis, Role, SessionId, SessionPatch, SessionRecord, SessionStatus, Turn};
pub use state::{transition, validate_write, SessionEvent};
