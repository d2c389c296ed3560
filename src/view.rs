//! Viewer-side projection of the session
//!
//! A viewer holds no state of its own: on every notification it re-reads
//! the record and builds a fresh [`SessionView`]. The bootstrap turn is
//! never shown.

use crate::history::project;
use crate::session::{Role, SessionRecord, SessionStatus, Turn};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

/// What a viewer displays for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Selected text, absent when there is no session
    pub original_text: Option<String>,
    /// Lifecycle status (`Idle` when there is no session)
    pub status: SessionStatus,
    /// Visible turns, bootstrap excluded
    pub turns: Vec<Turn>,
    /// Failure description when the status is `Error`
    pub error_message: Option<String>,
    /// True when a follow-up may be sent now
    pub can_follow_up: bool,
}

impl SessionView {
    /// Build the view for `record` (or for an empty store)
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::session::{SessionRecord, SessionStatus};
    /// use suikou::view::SessionView;
    ///
    /// let view = SessionView::from_record(Some(&SessionRecord::new("hello")));
    /// assert_eq!(view.status, SessionStatus::Loading);
    /// assert!(view.turns.is_empty());
    /// assert!(!view.can_follow_up);
    ///
    /// let idle = SessionView::from_record(None);
    /// assert_eq!(idle.status, SessionStatus::Idle);
    /// ```
    pub fn from_record(record: Option<&SessionRecord>) -> Self {
        match record {
            None => Self {
                original_text: None,
                status: SessionStatus::Idle,
                turns: Vec::new(),
                error_message: None,
                can_follow_up: false,
            },
            Some(record) => Self {
                original_text: Some(record.original_text.clone()),
                status: record.status,
                turns: project(&record.history).to_vec(),
                error_message: record.error_message.clone(),
                can_follow_up: record.status.is_terminal(),
            },
        }
    }

    /// Render the view as terminal text
    pub fn render(&self) -> String {
        let mut out = String::new();

        let Some(original) = &self.original_text else {
            let _ = writeln!(out, "{}", "No proofreading result yet.".dimmed());
            let _ = writeln!(
                out,
                "Run `suikou proofread <TEXT>` to rewrite a piece of text."
            );
            return out;
        };

        let _ = writeln!(out, "{}", "Original text".bold());
        let _ = writeln!(out, "{}\n", indent(original));

        for turn in &self.turns {
            let label = match turn.role {
                Role::User => "You".cyan().bold(),
                Role::Assistant => "Assistant".green().bold(),
            };
            let _ = writeln!(out, "{}", label);
            if turn.pending && turn.content.is_empty() {
                let _ = writeln!(out, "{}\n", indent("…").dimmed());
            } else {
                let _ = writeln!(out, "{}\n", indent(&turn.content));
            }
        }

        match self.status {
            SessionStatus::Loading => {
                let _ = writeln!(out, "{}", "Proofreading, please wait...".yellow());
            }
            SessionStatus::Error => {
                let message = self.error_message.as_deref().unwrap_or("unknown error");
                let _ = writeln!(out, "{} {}", "Error:".red().bold(), message);
            }
            _ => {}
        }

        out
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
