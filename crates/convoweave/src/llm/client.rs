//! LLM HTTP client.

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::error::{LlmError, LlmResult};
use super::types::*;

/// Default chat model.
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Transcription model.
const TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

/// Client for the OpenAI-compatible LLM service.
#[derive(Debug, Clone)]
pub struct LlmClient {
    /// HTTP client.
    client: Client,
    /// Base URL (e.g., "https://api.groq.com/openai/v1").
    base_url: String,
    /// API key; empty when the client is disabled.
    api_key: String,
    /// Chat model identifier.
    model: String,
    /// Whether the service is configured at all.
    enabled: bool,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(serde::Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl LlmClient {
    /// Create a new client.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            enabled: true,
        }
    }

    /// Create a disabled client. Every operation fails with
    /// [`LlmError::Disabled`] and callers fall back to defaults.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            enabled: false,
        }
    }

    /// Whether the service is configured.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Analyze a chat message for sentiment and emotion.
    pub async fn analyze_chat_sentiment(&self, message: &str) -> LlmResult<ChatSentiment> {
        let prompt = format!(
            "Analyze this chat message for sentiment and emotion.\n\
             Message: \"{message}\"\n\n\
             Respond with ONLY a JSON object (no markdown):\n\
             {{\n\
             \x20 \"sentiment\": <0 to 1 float, 0.5 is neutral>,\n\
             \x20 \"emotion\": \"<angry|sad|neutral|happy|excited>\",\n\
             \x20 \"confidence\": <0 to 1 float>,\n\
             \x20 \"summary\": \"<one-line analysis>\"\n\
             }}"
        );
        let reply = self.complete(&prompt, 0.3, 200).await?;
        parse_json_reply(&reply)
    }

    /// Analyze tone, energy and stress from a speech transcription.
    pub async fn analyze_speech_tone(&self, transcription: &str) -> LlmResult<ToneScores> {
        let prompt = format!(
            "Analyze the tone and energy level from this speech transcription.\n\
             Transcription: \"{transcription}\"\n\n\
             Respond with ONLY a JSON object (no markdown):\n\
             {{\n\
             \x20 \"tone\": \"<calm|neutral|excited|stressed>\",\n\
             \x20 \"energy\": <0 to 1 float>,\n\
             \x20 \"stress_level\": <0 to 1 float>,\n\
             \x20 \"engagement\": <0 to 1 float>\n\
             }}"
        );
        let reply = self.complete(&prompt, 0.3, 200).await?;
        parse_json_reply(&reply)
    }

    /// Transcribe an audio clip.
    pub async fn transcribe_audio(&self, audio: Vec<u8>) -> LlmResult<Transcription> {
        if !self.enabled {
            return Err(LlmError::Disabled);
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        let file = reqwest::multipart::Part::bytes(audio)
            .file_name("clip.wav")
            .mime_str("audio/wav")
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", "en");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message });
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        Ok(Transcription {
            text: body.text,
            // The service does not report confidence.
            confidence: 0.9,
            language: "en".to_string(),
        })
    }

    /// Generate a concise meeting summary from the session digest.
    pub async fn generate_meeting_summary(&self, digest: &SessionDigest) -> LlmResult<String> {
        let chat_lines = if digest.chat.is_empty() {
            "No chat messages".to_string()
        } else {
            digest
                .chat
                .iter()
                .rev()
                .take(20)
                .rev()
                .map(|line| format!("- {}: {}", line.speaker, line.message))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = format!(
            "Generate a concise meeting summary (3-5 sentences) based on:\n\n\
             Participants: {}\n\
             Duration: {:.1} minutes\n\
             Avg Engagement: {:.2} (0-1 scale)\n\
             Avg Confusion: {:.2} (0-1 scale)\n\
             Avg Stress: {:.2} (0-1 scale)\n\n\
             Recent chat messages:\n{}\n\n\
             Provide actionable insights and overall meeting sentiment.",
            digest.participants,
            digest.duration_seconds / 60.0,
            digest.engagement.unwrap_or(0.0),
            digest.confusion.unwrap_or(0.0),
            digest.stress.unwrap_or(0.0),
            chat_lines,
        );

        let reply = self.complete(&prompt, 0.5, 300).await?;
        Ok(reply.trim().to_string())
    }

    /// Run a single-turn chat completion and return the reply text.
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> LlmResult<String> {
        if !self.enabled {
            return Err(LlmError::Disabled);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ParseError("reply contained no choices".to_string()))
    }
}

/// Parse a JSON object out of a model reply, tolerating markdown fences.
fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> LlmResult<T> {
    let trimmed = strip_fences(reply.trim());
    serde_json::from_str(trimmed).map_err(|e| LlmError::ParseError(format!("{e}: {trimmed}")))
}

fn strip_fences(reply: &str) -> &str {
    let reply = reply
        .strip_prefix("```json")
        .or_else(|| reply.strip_prefix("```"))
        .unwrap_or(reply);
    reply.strip_suffix("```").unwrap_or(reply).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_client_reports_unavailable() {
        let client = LlmClient::disabled();
        assert!(!client.is_enabled());

        let err = client.analyze_chat_sentiment("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Disabled));

        let err = client.transcribe_audio(vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
    }

    #[test]
    fn test_parse_json_reply_plain() {
        let sentiment: ChatSentiment = parse_json_reply(
            r#"{"sentiment": 0.9, "emotion": "happy", "confidence": 0.8, "summary": "positive"}"#,
        )
        .unwrap();
        assert_eq!(sentiment.emotion, "happy");
        assert_eq!(sentiment.sentiment, 0.9);
    }

    #[test]
    fn test_parse_json_reply_strips_fences() {
        let reply = "```json\n{\"tone\": \"calm\", \"energy\": 0.4, \"stress_level\": 0.2, \"engagement\": 0.7}\n```";
        let tone: ToneScores = parse_json_reply(reply).unwrap();
        assert_eq!(tone.tone, "calm");
        assert_eq!(tone.engagement, 0.7);
    }

    #[test]
    fn test_parse_json_reply_rejects_prose() {
        let result: LlmResult<ChatSentiment> = parse_json_reply("Sure! The sentiment is positive.");
        assert!(matches!(result, Err(LlmError::ParseError(_))));
    }

    #[test]
    fn test_fallback_summary_names_counts() {
        let digest = SessionDigest {
            name: "Standup".to_string(),
            duration_seconds: 600.0,
            participants: 3,
            engagement: Some(0.5),
            confusion: Some(0.2),
            stress: Some(0.1),
            chat: vec![ChatLine {
                speaker: "Ada".to_string(),
                message: "hi".to_string(),
            }],
        };
        let summary = digest.fallback_summary();
        assert!(summary.contains("Standup"));
        assert!(summary.contains("3 participant"));
        assert!(summary.contains("1 chat message"));
    }
}
