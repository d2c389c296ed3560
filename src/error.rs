//! Error types for Suikou
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Suikou operations
///
/// Covers caller-facing request rejections (validation, concurrency),
/// generation failures reported by an AI provider, session store
/// failures, and configuration problems.
#[derive(Error, Debug)]
pub enum SuikouError {
    /// Input rejected before any state change (empty text or message)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A generation is already in flight for the current session
    #[error("A request is already in progress (status: {status})")]
    ConcurrentRequest {
        /// Status of the session when the request was rejected
        status: String,
    },

    /// The AI provider failed to produce a response
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The AI provider did not finish within the configured timeout
    #[error("Generation timed out after {seconds}s")]
    Timeout {
        /// Timeout that elapsed, in seconds
        seconds: u64,
    },

    /// The session an operation started with is no longer current
    #[error("Session superseded: {0}")]
    Superseded(String),

    /// No session exists in the store
    #[error("No active session")]
    NoActiveSession,

    /// A write would perform an illegal state transition
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Status before the write
        from: String,
        /// Status requested by the write
        to: String,
    },

    /// A write would break a session record invariant
    #[error("Session invariant violated: {0}")]
    InvariantViolation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (client construction, unknown provider)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Session store errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse classification of request errors
///
/// Callers that only observe the store never see these; they exist for
/// the call boundary (CLI, HTTP surface) to map failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty input
    Validation,
    /// Generation already in flight
    ConcurrentRequest,
    /// Provider failure or timeout
    Generation,
    /// Stale session
    Superseded,
    /// Anything else
    Other,
}

impl SuikouError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ConcurrentRequest { .. } => ErrorKind::ConcurrentRequest,
            Self::Generation(_) | Self::Timeout { .. } => ErrorKind::Generation,
            Self::Superseded(_) | Self::NoActiveSession => ErrorKind::Superseded,
            _ => ErrorKind::Other,
        }
    }

    /// Classify an `anyhow::Error`, looking through to a `SuikouError`
    ///
    /// # Examples
    ///
    /// ```
    /// use suikou::error::{ErrorKind, SuikouError};
    ///
    /// let err: anyhow::Error = SuikouError::Validation("empty".to_string()).into();
    /// assert_eq!(SuikouError::kind_of(&err), ErrorKind::Validation);
    /// ```
    pub fn kind_of(err: &anyhow::Error) -> ErrorKind {
        err.downcast_ref::<SuikouError>()
            .map(SuikouError::kind)
            .unwrap_or(ErrorKind::Other)
    }
}

/// Result type alias for Suikou operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
