//! Conversation history rules
//!
//! History is append-only. `history[0]` is the bootstrap turn that carries
//! the proofreading prompt; it is stored so the record shows exactly what
//! the model was asked, and hidden from every display by [`project`].
//! Follow-ups append the user's turn and an empty pending placeholder
//! before the provider is contacted; the accumulator later fills that
//! placeholder in place.

use crate::prompts::{
    bootstrap_prompt, original_text_context, CHAT_SYSTEM_PROMPT, PROOFREAD_SYSTEM_PROMPT,
};
use crate::providers::Message;
use crate::session::Turn;

/// The user turn stored as `history[0]` for `original_text`
///
/// # Examples
///
/// ```
/// use suikou::history::bootstrap_turn;
/// use suikou::session::Role;
///
/// let turn = bootstrap_turn("teh cat");
/// assert_eq!(turn.role, Role::User);
/// assert!(!turn.pending);
/// assert!(turn.content.ends_with("teh cat"));
/// ```
pub fn bootstrap_turn(original_text: &str) -> Turn {
    Turn::user(bootstrap_prompt(original_text))
}

/// Display projection: every turn except `history[0]`
///
/// The first element is dropped unconditionally, whatever it contains.
///
/// # Examples
///
/// ```
/// use suikou::history::project;
/// use suikou::session::Turn;
///
/// let history = vec![Turn::user("bootstrap"), Turn::assistant("A"), Turn::user("B")];
/// assert_eq!(project(&history), &[Turn::assistant("A"), Turn::user("B")]);
/// assert!(project(&[]).is_empty());
/// ```
pub fn project(history: &[Turn]) -> &[Turn] {
    history.get(1..).unwrap_or(&[])
}

/// History with a follow-up appended: the user's turn, then a placeholder
pub fn append_follow_up(history: &[Turn], message: &str) -> Vec<Turn> {
    let mut next = Vec::with_capacity(history.len() + 2);
    next.extend_from_slice(history);
    next.push(Turn::user(message));
    next.push(Turn::placeholder());
    next
}

/// Index of the pending placeholder, if the last turn is one
pub fn placeholder_index(history: &[Turn]) -> Option<usize> {
    match history.last() {
        Some(turn) if turn.is_placeholder() => Some(history.len() - 1),
        _ => None,
    }
}

/// Messages for the initial proofreading request
pub fn proofreading_messages(original_text: &str) -> Vec<Message> {
    vec![
        Message::system(PROOFREAD_SYSTEM_PROMPT),
        Message::from(&bootstrap_turn(original_text)),
    ]
}

/// Messages for a follow-up request
///
/// `prior_history` is the history as it stood before the follow-up was
/// appended. The bootstrap turn is replaced by a short context line
/// naming the original text, and turns that never produced content
/// (pending or empty) are left out.
///
/// # Examples
///
/// ```
/// use suikou::history::{bootstrap_turn, follow_up_messages};
/// use suikou::session::Turn;
///
/// let prior = vec![bootstrap_turn("x"), Turn::assistant("Rewritten x")];
/// let messages = follow_up_messages(&prior, "x", "Why?");
/// let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
/// assert_eq!(roles, ["system", "user", "assistant", "user"]);
/// assert_eq!(messages[3].content, "Why?");
/// ```
pub fn follow_up_messages(
    prior_history: &[Turn],
    original_text: &str,
    message: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(prior_history.len() + 2);
    messages.push(Message::system(CHAT_SYSTEM_PROMPT));
    messages.push(Message::user(original_text_context(original_text)));
    messages.extend(
        project(prior_history)
            .iter()
            .filter(|turn| !turn.pending && !turn.content.is_empty())
            .map(Message::from),
    );
    messages.push(Message::user(message));
    messages
}
