//! REST API handlers.
//!
//! Thin adapters translating transport-level calls into controller and
//! registry operations. Everything stateful happens behind those seams.

use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::llm::ToneScores;
use crate::session::aggregator::{self, SessionSummary};
use crate::session::models::{
    CreateSessionRequest, JoinSessionRequest, MAX_DISPLAY_NAME_LEN, MAX_SESSION_NAME_LEN,
    TranscriptEntry,
};
use crate::vision::FrameScores;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Number of live sessions.
    pub sessions: usize,
}

/// Health check endpoint.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.registry.len(),
    })
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Response from session creation.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

/// Create a new session.
///
/// POST /sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    if request.name.chars().count() > MAX_SESSION_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "session name must be at most {MAX_SESSION_NAME_LEN} characters"
        )));
    }
    if let Some(host_name) = &request.host_display_name {
        if host_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(ApiError::bad_request(format!(
                "host display name must be at most {MAX_DISPLAY_NAME_LEN} characters"
            )));
        }
    }

    let session = state.registry.create(request);

    // Persist the initial snapshot, best effort.
    if let Some(store) = &state.store {
        if let Err(e) = store.save_session(&session).await {
            warn!(
                "Failed to persist new session {}: {:?}",
                session.session_id, e
            );
        }
    }

    Ok(Json(CreateSessionResponse {
        session_id: session.session_id,
        name: session.name,
        host_id: session.host_id,
    }))
}

/// Session metadata returned to REST callers.
#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub name: String,
    /// Participant count.
    pub participants: usize,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_display_name: Option<String>,
}

/// Fetch session metadata.
///
/// GET /sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionInfoResponse>> {
    let session = state.registry.get(&session_id).await?;
    Ok(Json(SessionInfoResponse {
        session_id: session.session_id,
        name: session.name,
        participants: session.participants.len(),
        active: true,
        host_id: session.host_id,
        host_display_name: session.host_display_name,
    }))
}

/// Response from joining a session.
#[derive(Debug, Serialize)]
pub struct JoinSessionResponse {
    pub participant_id: String,
    pub session_id: String,
}

/// Join a session.
///
/// POST /sessions/{session_id}/participants
pub async fn join_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<JoinSessionRequest>,
) -> ApiResult<Json<JoinSessionResponse>> {
    if request.display_name.is_empty() {
        return Err(ApiError::bad_request("display name must not be empty"));
    }
    if request.display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "display name must be at most {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }

    let participant_id = state
        .controller
        .join(&session_id, request.participant_id, &request.display_name)
        .await?;

    Ok(Json(JoinSessionResponse {
        participant_id,
        session_id,
    }))
}

/// Fetch the current session summary.
///
/// GET /sessions/{session_id}/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    let session = state.registry.get(&session_id).await?;
    Ok(Json(aggregator::summarize(&session.participants)))
}

/// End a session and return its final summary.
///
/// POST /sessions/{session_id}/end
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    let summary = state.controller.end_session(&session_id).await?;
    Ok(Json(summary))
}

// ============================================================================
// AI meeting summary
// ============================================================================

/// Response from AI summary generation.
#[derive(Debug, Serialize)]
pub struct GenerateSummaryResponse {
    pub summary: String,
    /// Base64 data URL of synthesized speech, when TTS is available.
    pub audio: Option<String>,
    /// Approximate audio duration in seconds.
    pub duration: Option<f64>,
}

/// Generate an AI meeting summary, with optional speech synthesis.
///
/// POST /sessions/{session_id}/generate-summary
pub async fn generate_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<GenerateSummaryResponse>> {
    let digest = state.controller.session_digest(&session_id).await?;

    let summary = match state.llm.generate_meeting_summary(&digest).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Meeting summary generation unavailable: {e}");
            digest.fallback_summary()
        }
    };

    let clip = if state.tts.is_enabled() {
        match state.tts.synthesize(&summary).await {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!("Speech synthesis failed: {e:?}");
                None
            }
        }
    } else {
        None
    };

    let (audio, duration) = match clip {
        Some(clip) => (Some(clip.audio), Some(clip.duration_seconds)),
        None => (None, None),
    };

    Ok(Json(GenerateSummaryResponse {
        summary,
        audio,
        duration,
    }))
}

// ============================================================================
// Audio transcription
// ============================================================================

/// Response from audio transcription.
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscribeResponse {
    fn unavailable(message: &str) -> Self {
        Self {
            text: None,
            confidence: None,
            tone: None,
            energy: None,
            stress_level: None,
            engagement: None,
            error: Some(message.to_string()),
        }
    }
}

/// Transcribe an uploaded audio clip and analyze its tone.
///
/// POST /sessions/{session_id}/transcribe-audio (multipart: file, participant_id?)
pub async fn transcribe_audio(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<TranscribeResponse>> {
    let session = state.registry.get(&session_id).await?;

    let mut audio: Option<Vec<u8>> = None;
    let mut participant_id: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("reading audio field: {e}")))?;
                audio = Some(bytes.to_vec());
            }
            Some("participant_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("reading participant id: {e}")))?;
                participant_id = Some(text);
            }
            _ => {}
        }
    }
    let audio = audio.ok_or_else(|| ApiError::bad_request("missing audio file"))?;

    let transcription = match state.llm.transcribe_audio(audio).await {
        Ok(transcription) if !transcription.text.is_empty() => transcription,
        Ok(_) => {
            return Ok(Json(TranscribeResponse::unavailable(
                "could not transcribe audio",
            )));
        }
        Err(e) => {
            warn!("Transcription unavailable for session {session_id}: {e}");
            return Ok(Json(TranscribeResponse::unavailable(
                "transcription unavailable",
            )));
        }
    };

    let tone = match state.llm.analyze_speech_tone(&transcription.text).await {
        Ok(tone) => tone,
        Err(e) => {
            warn!("Tone analysis unavailable, using defaults: {e}");
            ToneScores::neutral()
        }
    };

    let participant_id = participant_id.unwrap_or_else(|| "unknown".to_string());
    let display_name = session
        .participants
        .get(&participant_id)
        .map(|p| p.display_name.clone());

    let entry = TranscriptEntry {
        participant_id,
        display_name,
        timestamp: Utc::now(),
        text: transcription.text.clone(),
        tone: Some(tone.tone.clone()),
        energy: Some(tone.energy),
        stress_level: Some(tone.stress_level),
    };
    state
        .controller
        .add_transcript_entry(&session_id, entry)
        .await?;

    Ok(Json(TranscribeResponse {
        text: Some(transcription.text),
        confidence: Some(transcription.confidence),
        tone: Some(tone.tone),
        energy: Some(tone.energy),
        stress_level: Some(tone.stress_level),
        engagement: Some(tone.engagement),
        error: None,
    }))
}

// ============================================================================
// Frame analysis
// ============================================================================

/// Request to analyze a single video frame.
#[derive(Debug, Deserialize)]
pub struct AnalyzeFrameRequest {
    /// Base64-encoded frame, optionally with a data URL prefix.
    #[serde(default)]
    pub frame: String,
    /// Participant the frame belongs to (informational).
    #[serde(default)]
    pub participant_id: Option<String>,
}

/// Analyze a single video frame for emotion scores.
///
/// POST /analyze/frame
pub async fn analyze_frame(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeFrameRequest>,
) -> Json<FrameScores> {
    Json(score_frame(&state, &request.frame))
}

/// Request to analyze a batch of frames.
#[derive(Debug, Deserialize)]
pub struct AnalyzeBatchRequest {
    #[serde(default)]
    pub frames: Vec<String>,
}

/// Response for batch frame analysis.
#[derive(Debug, Serialize)]
pub struct AnalyzeBatchResponse {
    pub results: Vec<FrameScores>,
}

/// Analyze multiple frames in one request.
///
/// POST /analyze/batch
pub async fn analyze_batch(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeBatchRequest>,
) -> Json<AnalyzeBatchResponse> {
    let results = request
        .frames
        .iter()
        .map(|frame| score_frame(&state, frame))
        .collect();
    Json(AnalyzeBatchResponse { results })
}

/// Decode a base64 frame (tolerating data URL prefixes) and score it.
/// Any failure yields safe fallback scores rather than an error.
fn score_frame(state: &AppState, frame: &str) -> FrameScores {
    let encoded = match frame.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:image") => rest,
        _ => frame,
    };
    match STANDARD.decode(encoded) {
        Ok(bytes) => state.frames.analyze(&bytes),
        Err(e) => {
            debug!("Frame decode error, using fallback scores: {e}");
            FrameScores::fallback()
        }
    }
}
