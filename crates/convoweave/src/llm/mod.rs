//! LLM collaborator client module.
//!
//! Provides an async client for the language-model service used for chat
//! sentiment, speech tone analysis, audio transcription and meeting
//! summaries. The service is optional: an unconfigured client reports
//! itself disabled and callers degrade to safe defaults.

mod client;
mod error;
mod types;

pub use client::LlmClient;
pub use error::{LlmError, LlmResult};
pub use types::*;
