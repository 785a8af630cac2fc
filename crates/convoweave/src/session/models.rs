//! Session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::SessionError;

/// Maximum length of a session name.
pub const MAX_SESSION_NAME_LEN: usize = 128;

/// Maximum length of a participant display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Maximum length of a chat message.
pub const MAX_CHAT_MESSAGE_LEN: usize = 2000;

/// How many trailing transcript entries clients receive in a snapshot.
pub const TRANSCRIPT_VIEW_LIMIT: usize = 50;

/// A single emotion/engagement reading attributed to a participant.
///
/// Immutable once constructed; a new reading replaces the participant's
/// `latest_signal` wholesale. Only the most recent reading is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Engagement level, 0.0 to 1.0.
    pub engagement: f64,
    /// Confusion level, 0.0 to 1.0.
    pub confusion: f64,
    /// Stress level, 0.0 to 1.0.
    pub stress: f64,
    /// Optional tone label (e.g., "calm", "excited").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Optional energy level, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// Optional sentiment score, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    /// When the reading was taken.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Check that every numeric field is inside its declared range.
    ///
    /// Called before any state mutation; an out-of-range payload must never
    /// replace a participant's previous signal.
    pub fn validate(&self) -> Result<(), SessionError> {
        for (field, value) in [
            ("engagement", self.engagement),
            ("confusion", self.confusion),
            ("stress", self.stress),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(SessionError::Validation(format!(
                    "{field} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        for (field, value) in [("energy", self.energy), ("sentiment", self.sentiment)] {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                    return Err(SessionError::Validation(format!(
                        "{field} must be between 0.0 and 1.0, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A chat message within a session. Immutable; appended to the sending
/// participant's history and never removed while the session lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// The message text.
    pub message: String,
    /// When the message was sent.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Chat {
    /// Check the message is non-empty and within the length bound.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.message.is_empty() {
            return Err(SessionError::Validation(
                "chat message must not be empty".to_string(),
            ));
        }
        if self.message.chars().count() > MAX_CHAT_MESSAGE_LEN {
            return Err(SessionError::Validation(format!(
                "chat message exceeds {MAX_CHAT_MESSAGE_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// One entry in a session's live transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Participant the speech is attributed to.
    pub participant_id: String,
    /// Display name at the time of transcription, if resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// When the entry was transcribed.
    pub timestamp: DateTime<Utc>,
    /// Transcribed text.
    pub text: String,
    /// Tone label from speech analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Energy level from speech analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// Stress level from speech analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f64>,
}

/// One connected user within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Identity, unique within the parent session.
    pub participant_id: String,
    /// Display name shown to other participants.
    pub display_name: String,
    /// Most recently received signal; absent until the first one arrives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_signal: Option<Signal>,
    /// Chat messages in arrival order.
    #[serde(default)]
    pub chat_history: Vec<Chat>,
}

impl Participant {
    /// Create a participant with no signal and no chat history.
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            latest_signal: None,
            chat_history: Vec::new(),
        }
    }
}

/// One live multi-participant session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID.
    pub session_id: String,
    /// Display name of the session.
    pub name: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was ended, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Identity of the host that created the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// Display name of the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_display_name: Option<String>,
    /// Whether live transcription is enabled.
    #[serde(default)]
    pub stt_enabled: bool,
    /// Append-only transcript log.
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    /// Participants keyed by id. Insertion order is irrelevant.
    #[serde(default)]
    pub participants: HashMap<String, Participant>,
}

impl Session {
    /// The trailing transcript entries clients receive in a snapshot.
    pub fn recent_transcript(&self) -> &[TranscriptEntry] {
        let start = self.transcript.len().saturating_sub(TRANSCRIPT_VIEW_LIMIT);
        &self.transcript[start..]
    }

    /// Participant-id to display-name map for snapshots.
    pub fn participant_names(&self) -> HashMap<String, String> {
        self.participants
            .iter()
            .map(|(id, p)| (id.clone(), p.display_name.clone()))
            .collect()
    }
}

/// Request to create a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Display name of the session.
    #[serde(default = "default_session_name")]
    pub name: String,
    /// Identity of the host creating the session.
    #[serde(default)]
    pub host_id: Option<String>,
    /// Display name of the host.
    #[serde(default)]
    pub host_display_name: Option<String>,
}

fn default_session_name() -> String {
    "Untitled session".to_string()
}

/// Request to join a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    /// Client-chosen participant id; generated when absent.
    #[serde(default)]
    pub participant_id: Option<String>,
    /// Display name shown to other participants.
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(engagement: f64, confusion: f64, stress: f64) -> Signal {
        Signal {
            engagement,
            confusion,
            stress,
            tone: None,
            energy: None,
            sentiment: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_signal_validate_in_range() {
        assert!(signal(0.0, 0.5, 1.0).validate().is_ok());
    }

    #[test]
    fn test_signal_validate_rejects_out_of_range() {
        let err = signal(1.5, 0.1, 0.1).validate().unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(err.to_string().contains("engagement"));

        assert!(signal(0.5, -0.1, 0.1).validate().is_err());
        assert!(signal(0.5, 0.1, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_signal_validate_optional_fields() {
        let mut s = signal(0.5, 0.5, 0.5);
        s.energy = Some(0.9);
        s.sentiment = Some(0.1);
        assert!(s.validate().is_ok());

        s.energy = Some(1.2);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_chat_validate() {
        let chat = Chat {
            message: "hello".to_string(),
            timestamp: Utc::now(),
        };
        assert!(chat.validate().is_ok());

        let empty = Chat {
            message: String::new(),
            timestamp: Utc::now(),
        };
        assert!(empty.validate().is_err());

        let long = Chat {
            message: "x".repeat(MAX_CHAT_MESSAGE_LEN + 1),
            timestamp: Utc::now(),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_recent_transcript_bounded() {
        let mut session = Session {
            session_id: "s".to_string(),
            name: "test".to_string(),
            created_at: Utc::now(),
            ended_at: None,
            host_id: None,
            host_display_name: None,
            stt_enabled: false,
            transcript: Vec::new(),
            participants: HashMap::new(),
        };

        for i in 0..60 {
            session.transcript.push(TranscriptEntry {
                participant_id: "p".to_string(),
                display_name: None,
                timestamp: Utc::now(),
                text: format!("entry {i}"),
                tone: None,
                energy: None,
                stress_level: None,
            });
        }

        let recent = session.recent_transcript();
        assert_eq!(recent.len(), TRANSCRIPT_VIEW_LIMIT);
        assert_eq!(recent[0].text, "entry 10");
        assert_eq!(recent.last().unwrap().text, "entry 59");
    }

    #[test]
    fn test_signal_deserialize_defaults_timestamp() {
        let s: Signal =
            serde_json::from_str(r#"{"engagement":0.5,"confusion":0.2,"stress":0.1}"#).unwrap();
        assert!(s.tone.is_none());
        assert!(s.validate().is_ok());
    }
}
