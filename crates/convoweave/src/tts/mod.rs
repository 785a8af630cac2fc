//! Text-to-speech collaborator client.
//!
//! Posts text to a configured synthesis service and returns the audio as a
//! base64 data URL. The service is optional; callers treat any failure as
//! "no audio" rather than an error.

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Maximum text length sent to the synthesis service.
const MAX_TTS_TEXT_LEN: usize = 500;

/// Approximate speech rate in characters per second, for duration estimates.
const CHARS_PER_SECOND: f64 = 2.5;

/// A synthesized speech clip.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechClip {
    /// Base64 data URL of the audio.
    pub audio: String,
    /// Approximate duration in seconds.
    pub duration_seconds: f64,
    /// Audio container format.
    pub format: &'static str,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// Client for the speech synthesis service.
#[derive(Debug, Clone)]
pub struct TtsClient {
    client: Client,
    /// Base URL of the synthesis service.
    base_url: String,
    /// Voice identifier to request.
    voice: String,
    /// Whether the service is configured.
    enabled: bool,
}

impl TtsClient {
    /// Create a new client.
    pub fn new(base_url: impl Into<String>, voice: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            voice: voice.into(),
            enabled: true,
        }
    }

    /// Create a disabled client; synthesis always fails and callers yield
    /// no audio.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            voice: String::new(),
            enabled: false,
        }
    }

    /// Whether the service is configured.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Synthesize speech for the given text.
    pub async fn synthesize(&self, text: &str) -> Result<SpeechClip> {
        if !self.enabled {
            bail!("TTS service is not configured");
        }

        let text: String = text.chars().take(MAX_TTS_TEXT_LEN).collect();
        let url = format!("{}/synthesize", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SynthesizeRequest {
                text: &text,
                voice: &self.voice,
            })
            .send()
            .await
            .context("requesting speech synthesis")?;

        if !response.status().is_success() {
            bail!("TTS service returned {}", response.status());
        }

        let audio = response.bytes().await.context("reading audio body")?;
        let encoded = STANDARD.encode(&audio);

        Ok(SpeechClip {
            audio: format!("data:audio/mp3;base64,{encoded}"),
            duration_seconds: text.chars().count() as f64 / CHARS_PER_SECOND,
            format: "mp3",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_client_yields_error() {
        let client = TtsClient::disabled();
        assert!(!client.is_enabled());
        assert!(client.synthesize("hello").await.is_err());
    }
}
