//! WebSocket message types for the session duplex channel.
//!
//! These types define the protocol between clients and the backend. Every
//! message in both directions is an envelope: `{"type": ..., "payload": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::session::aggregator::SessionSummary;
use crate::session::models::{Signal, TranscriptEntry};

// ============================================================================
// Envelopes (Client -> Server)
// ============================================================================

/// Inbound envelope from a client.
///
/// The type is kept as a plain string so unrecognized types can be named in
/// the error reply instead of failing deserialization outright.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    /// Envelope type: "signal", "chat" or "stt_toggle".
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload, parsed by the controller.
    #[serde(default)]
    pub payload: Value,
}

/// Payload of an `stt_toggle` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SttTogglePayload {
    /// New value for the live-transcription flag.
    #[serde(default)]
    pub enabled: bool,
}

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Session metadata included in the initial snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    /// Session id.
    pub id: String,
    /// Session display name.
    pub name: String,
    /// Host identity, if one was recorded at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// Host display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_display_name: Option<String>,
}

/// Events sent from the backend to clients over the duplex channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Initial snapshot sent once per connection, right after registration.
    SessionInit {
        session: SessionMeta,
        /// Participant id -> display name.
        participants: HashMap<String, String>,
        summary: SessionSummary,
        stt_enabled: bool,
        /// Trailing transcript entries (bounded view).
        transcript: Vec<TranscriptEntry>,
    },

    /// A participant's signal changed; carries the recomputed summary.
    SessionUpdate {
        participant_id: String,
        display_name: String,
        signal: Signal,
        summary: SessionSummary,
    },

    /// A chat message, annotated with sentiment analysis.
    Chat {
        participant_id: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
        sentiment: f64,
        emotion: String,
        confidence: f64,
    },

    /// The live-transcription flag changed.
    SttToggle { enabled: bool },

    /// A participant joined the session.
    ParticipantJoined {
        participant_id: String,
        display_name: String,
    },

    /// A participant left the session.
    ParticipantLeft { participant_id: String },

    /// A new transcript entry was produced.
    Transcript(TranscriptEntry),

    /// The session was explicitly ended; carries the final summary.
    SessionEnded {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        host_id: Option<String>,
        summary: SessionSummary,
    },

    /// Error reply, unicast to the offending connection only.
    Error { message: String },
}
