//! LLM client error types.

use thiserror::Error;

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured; the collaborator is unavailable.
    #[error("LLM service is not configured")]
    Disabled,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The service returned a non-success status.
    #[error("LLM service error: {status}: {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse the model's reply.
    #[error("Failed to parse LLM reply: {0}")]
    ParseError(String),
}
