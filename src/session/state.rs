//! Session state machine
//!
//! ```text
//! Idle --start--> Loading --firstDelta--> Streaming --finish--> Complete
//! Loading|Streaming --fail--> Error
//! Complete|Error --followUp--> Streaming
//! any --reset--> Idle
//! ```
//!
//! `Idle` is never stored: an empty slot is the idle session. Every store
//! write runs through [`validate_write`], which enforces the transition
//! table above together with the history invariants.

use crate::error::{Result, SuikouError};
use crate::session::record::{SessionRecord, SessionStatus};

/// Events that drive the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// New top-level request
    Start,
    /// First delta of the current turn
    FirstDelta,
    /// Any later delta
    Delta,
    /// Stream ended normally
    Finish,
    /// Provider failed or timed out
    Fail,
    /// User follow-up message
    FollowUp,
    /// External reset
    Reset,
}

/// Compute the status reached by applying `event` in `from`
///
/// # Errors
///
/// - `SuikouError::ConcurrentRequest` for `Start`/`FollowUp` while a
///   generation is in flight
/// - `SuikouError::NoActiveSession` for `FollowUp` on an idle session
/// - `SuikouError::InvalidTransition` for anything else not in the table
///
/// # Examples
///
/// ```
/// use suikou::session::{transition, SessionEvent, SessionStatus};
///
/// let next = transition(SessionStatus::Complete, SessionEvent::FollowUp).unwrap();
/// assert_eq!(next, SessionStatus::Streaming);
/// assert!(transition(SessionStatus::Streaming, SessionEvent::FollowUp).is_err());
/// ```
pub fn transition(from: SessionStatus, event: SessionEvent) -> Result<SessionStatus> {
    use SessionEvent as E;
    use SessionStatus as S;

    let to = match (from, event) {
        (_, E::Reset) => S::Idle,
        (S::Loading | S::Streaming, E::Start | E::FollowUp) => {
            return Err(SuikouError::ConcurrentRequest {
                status: from.to_string(),
            }
            .into())
        }
        (S::Idle | S::Complete | S::Error, E::Start) => S::Loading,
        (S::Idle, E::FollowUp) => return Err(SuikouError::NoActiveSession.into()),
        (S::Complete | S::Error, E::FollowUp) => S::Streaming,
        (S::Loading, E::FirstDelta) => S::Streaming,
        (S::Streaming, E::Delta) => S::Streaming,
        (S::Loading | S::Streaming, E::Finish) => S::Complete,
        (S::Loading | S::Streaming, E::Fail) => S::Error,
        (from, event) => {
            return Err(SuikouError::InvalidTransition {
                from: from.to_string(),
                to: format!("{:?}", event).to_lowercase(),
            }
            .into())
        }
    };

    Ok(to)
}

/// Events that change a stored record without replacing it
///
/// `Start` opens a new record and `Reset` empties the slot, so neither
/// is a step within one stored session.
const WRITE_EVENTS: [SessionEvent; 5] = [
    SessionEvent::FirstDelta,
    SessionEvent::Delta,
    SessionEvent::Finish,
    SessionEvent::Fail,
    SessionEvent::FollowUp,
];

/// True if some event in [`transition`] takes a stored record from `from` to `to`
fn is_legal_write(from: SessionStatus, to: SessionStatus) -> bool {
    WRITE_EVENTS
        .iter()
        .any(|event| transition(from, *event).is_ok_and(|next| next == to))
}

/// Check that writing `next` over `previous` is a legal step
///
/// A write whose id differs from the stored one (or that lands on an
/// empty slot) starts a new session and must be a `Loading` record whose
/// history is exactly the bootstrap turn.
///
/// # Errors
///
/// Returns `SuikouError::InvalidTransition` or
/// `SuikouError::InvariantViolation` describing the first broken rule.
pub fn validate_write(previous: Option<&SessionRecord>, next: &SessionRecord) -> Result<()> {
    if next.status == SessionStatus::Idle {
        return Err(SuikouError::InvariantViolation(
            "idle sessions are represented by an empty store; use clear()".to_string(),
        )
        .into());
    }

    match previous.filter(|prev| prev.id == next.id) {
        None => validate_new_session(next)?,
        Some(prev) => validate_same_session(prev, next)?,
    }

    validate_pending(next)?;
    validate_error_message(next)
}

fn validate_new_session(next: &SessionRecord) -> Result<()> {
    if next.status != transition(SessionStatus::Idle, SessionEvent::Start)? {
        return Err(SuikouError::InvalidTransition {
            from: SessionStatus::Idle.to_string(),
            to: next.status.to_string(),
        }
        .into());
    }

    match next.history.as_slice() {
        [bootstrap] if bootstrap == &crate::history::bootstrap_turn(&next.original_text) => Ok(()),
        _ => Err(SuikouError::InvariantViolation(
            "a new session must start with exactly the bootstrap turn".to_string(),
        )
        .into()),
    }
}

fn validate_same_session(prev: &SessionRecord, next: &SessionRecord) -> Result<()> {
    if !is_legal_write(prev.status, next.status) {
        return Err(SuikouError::InvalidTransition {
            from: prev.status.to_string(),
            to: next.status.to_string(),
        }
        .into());
    }

    if prev.original_text != next.original_text {
        return Err(SuikouError::InvariantViolation(
            "originalText is immutable for the life of a session".to_string(),
        )
        .into());
    }

    if next.history.len() < prev.history.len() {
        return Err(
            SuikouError::InvariantViolation("history is append-only".to_string()).into(),
        );
    }

    // Settled turns never change; only a pending turn may be filled in.
    for (index, (before, after)) in prev.history.iter().zip(&next.history).enumerate() {
        let changed = if before.pending {
            before.role != after.role
        } else {
            before != after
        };
        if changed {
            let what = if index == 0 {
                "the bootstrap turn is immutable".to_string()
            } else {
                format!("turn {} was rewritten after it settled", index)
            };
            return Err(SuikouError::InvariantViolation(what).into());
        }
    }

    Ok(())
}

fn validate_pending(next: &SessionRecord) -> Result<()> {
    let pending = next.pending_count();
    if pending > 1 {
        return Err(SuikouError::InvariantViolation(format!(
            "{} turns are pending; at most one generation may be in flight",
            pending
        ))
        .into());
    }

    if pending == 1 {
        if next.status.is_terminal() {
            return Err(SuikouError::InvariantViolation(format!(
                "a {} session cannot have a pending turn",
                next.status
            ))
            .into());
        }
        if next.placeholder().is_none() {
            return Err(SuikouError::InvariantViolation(
                "only the last assistant turn may be pending".to_string(),
            )
            .into());
        }
    }

    Ok(())
}

fn validate_error_message(next: &SessionRecord) -> Result<()> {
    match (next.status, next.error_message.as_deref()) {
        (SessionStatus::Error, Some(message)) if !message.is_empty() => Ok(()),
        (SessionStatus::Error, _) => Err(SuikouError::InvariantViolation(
            "an error session needs a non-empty errorMessage".to_string(),
        )
        .into()),
        (_, Some(_)) => Err(SuikouError::InvariantViolation(
            "errorMessage is only allowed in the error state".to_string(),
        )
        .into()),
        _ => Ok(()),
    }
}
