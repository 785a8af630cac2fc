//! LLM request/response types.

use serde::{Deserialize, Serialize};

/// Sentiment analysis of a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSentiment {
    /// Sentiment score, 0.0 (negative) to 1.0 (positive), 0.5 neutral.
    pub sentiment: f64,
    /// Emotion label: angry, sad, neutral, happy or excited.
    pub emotion: String,
    /// Model confidence, 0.0 to 1.0.
    pub confidence: f64,
    /// One-line analysis, when the model provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ChatSentiment {
    /// Safe default used when the collaborator is unavailable or errors.
    pub fn neutral() -> Self {
        Self {
            sentiment: 0.5,
            emotion: "neutral".to_string(),
            confidence: 0.7,
            summary: None,
        }
    }
}

/// Tone analysis of transcribed speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneScores {
    /// Tone label: calm, neutral, excited or stressed.
    pub tone: String,
    /// Energy level, 0.0 to 1.0.
    pub energy: f64,
    /// Stress level, 0.0 to 1.0.
    pub stress_level: f64,
    /// Engagement level, 0.0 to 1.0.
    pub engagement: f64,
}

impl ToneScores {
    /// Safe default used when the collaborator is unavailable or errors.
    pub fn neutral() -> Self {
        Self {
            tone: "neutral".to_string(),
            energy: 0.5,
            stress_level: 0.3,
            engagement: 0.6,
        }
    }
}

/// Result of transcribing an audio clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    /// Transcribed text.
    pub text: String,
    /// Transcription confidence, 0.0 to 1.0.
    pub confidence: f64,
    /// Detected or assumed language code.
    pub language: String,
}

/// One chat line included in a meeting-summary digest.
#[derive(Debug, Clone)]
pub struct ChatLine {
    /// Display name (or id) of the speaker.
    pub speaker: String,
    /// Message text.
    pub message: String,
}

/// Condensed session data handed to the summary generator.
#[derive(Debug, Clone)]
pub struct SessionDigest {
    /// Session display name.
    pub name: String,
    /// Session duration in seconds.
    pub duration_seconds: f64,
    /// Participant count.
    pub participants: usize,
    /// Mean engagement, when any signal was received.
    pub engagement: Option<f64>,
    /// Mean confusion.
    pub confusion: Option<f64>,
    /// Mean stress.
    pub stress: Option<f64>,
    /// Chat history across all participants, in rough arrival order.
    pub chat: Vec<ChatLine>,
}

impl SessionDigest {
    /// Plain-text summary used when the LLM collaborator is unavailable.
    pub fn fallback_summary(&self) -> String {
        format!(
            "AI summary unavailable. Meeting \"{}\" had {} participant(s) and {} chat message(s).",
            self.name,
            self.participants,
            self.chat.len()
        )
    }
}
