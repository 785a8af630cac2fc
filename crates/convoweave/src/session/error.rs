//! Session error types.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur against session state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session or participant does not exist (including after destruction).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range payload. State is left unchanged.
    #[error("invalid payload: {0}")]
    Validation(String),
}

impl SessionError {
    pub fn session_not_found(session_id: &str) -> Self {
        Self::NotFound(format!("session not found: {session_id}"))
    }

    pub fn participant_not_found(participant_id: &str) -> Self {
        Self::NotFound(format!("participant not found: {participant_id}"))
    }
}
