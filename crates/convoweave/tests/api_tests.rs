//! API integration tests.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::test_app;

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_session(app: &Router, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/sessions",
        Some(json!({"name": name})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["session_id"].as_str().unwrap().to_string()
}

/// Test that the health endpoint reports the live session count.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["sessions"], 0);

    create_session(&app, "Standup").await;
    let (_, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(body["sessions"], 1);
}

/// Test creating a session and fetching its metadata.
#[tokio::test]
async fn test_create_and_get_session() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({"name": "Standup", "host_id": "h1", "host_display_name": "Ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Standup");
    assert_eq!(body["host_id"], "h1");
    let session_id = body["session_id"].as_str().unwrap();

    let (status, body) = send(&app, Method::GET, &format!("/sessions/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Standup");
    assert_eq!(body["participants"], 0);
    assert_eq!(body["active"], true);
    assert_eq!(body["host_display_name"], "Ada");
}

/// Test that the session name defaults when omitted.
#[tokio::test]
async fn test_create_session_default_name() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::POST, "/sessions", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Untitled session");
}

/// Test that an over-long session name is rejected.
#[tokio::test]
async fn test_create_session_name_too_long() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({"name": "x".repeat(129)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

/// Test that fetching an unknown session returns a structured 404.
#[tokio::test]
async fn test_get_unknown_session() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

/// Test joining a session, including idempotent rejoin.
#[tokio::test]
async fn test_join_session_idempotent() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/participants"),
        Some(json!({"participant_id": "p1", "display_name": "Ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participant_id"], "p1");
    assert_eq!(body["session_id"], session_id);

    // Rejoining with the same id updates the name without duplicating.
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/participants"),
        Some(json!({"participant_id": "p1", "display_name": "Ada L."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, &format!("/sessions/{session_id}"), None).await;
    assert_eq!(body["participants"], 1);
}

/// Test that joining generates a participant id when none is supplied.
#[tokio::test]
async fn test_join_session_generates_id() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/participants"),
        Some(json!({"display_name": "Grace"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["participant_id"].as_str().unwrap().is_empty());
}

/// Test join validation and 404 behavior.
#[tokio::test]
async fn test_join_session_failures() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions/nope/participants",
        Some(json!({"display_name": "Ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/participants"),
        Some(json!({"display_name": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Test that a fresh session's summary is in the waiting state.
#[tokio::test]
async fn test_summary_waiting() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/participants"),
        Some(json!({"participant_id": "p1", "display_name": "Ada"})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/sessions/{session_id}/summary"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["participants"], 1);
    assert!(body.get("engagement").is_none());
}

/// Test ending a session: final summary, then NotFound forever after.
#[tokio::test]
async fn test_end_session_round_trip() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/end"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participants"], 0);

    let (status, _) = send(&app, Method::GET, &format!("/sessions/{session_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/end"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test AI summary generation falls back to plain text when the LLM
/// collaborator is unavailable.
#[tokio::test]
async fn test_generate_summary_degrades() {
    let app = test_app().await;
    let session_id = create_session(&app, "Retro").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{session_id}/generate-summary"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let summary = body["summary"].as_str().unwrap();
    assert!(summary.contains("AI summary unavailable"));
    assert!(summary.contains("Retro"));
    assert!(body["audio"].is_null());
    assert!(body["duration"].is_null());
}

/// Test frame analysis returns safe defaults for undecodable input.
#[tokio::test]
async fn test_analyze_frame_fallback() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/analyze/frame",
        Some(json!({"frame": "definitely-not-base64!!!"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engagement"], 0.5);
    assert_eq!(body["confusion"], 0.2);
    assert_eq!(body["stress"], 0.1);
    assert_eq!(body["detected_face"], false);

    // Empty frame too.
    let (status, body) = send(&app, Method::POST, "/analyze/frame", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detected_face"], false);
}

/// Test batch frame analysis returns one result per frame.
#[tokio::test]
async fn test_analyze_batch() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/analyze/batch",
        Some(json!({"frames": ["aaa", "bbb", "ccc"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
}

/// Test transcription endpoint validation: unknown session and missing file.
#[tokio::test]
async fn test_transcribe_audio_failures() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    // Unknown session.
    let request = Request::builder()
        .uri("/sessions/nope/transcribe-audio")
        .method(Method::POST)
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=xxBOUNDARYxx",
        )
        .body(Body::from("--xxBOUNDARYxx--\r\n"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Missing file field.
    let request = Request::builder()
        .uri(format!("/sessions/{session_id}/transcribe-audio"))
        .method(Method::POST)
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=xxBOUNDARYxx",
        )
        .body(Body::from("--xxBOUNDARYxx--\r\n"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test transcription degrades when the STT collaborator is unavailable.
#[tokio::test]
async fn test_transcribe_audio_degrades() {
    let app = test_app().await;
    let session_id = create_session(&app, "Standup").await;

    let body_text = concat!(
        "--xxBOUNDARYxx\r\n",
        "Content-Disposition: form-data; name=\"file\"; filename=\"clip.wav\"\r\n",
        "Content-Type: audio/wav\r\n",
        "\r\n",
        "RIFFfakeaudio\r\n",
        "--xxBOUNDARYxx--\r\n",
    );
    let request = Request::builder()
        .uri(format!("/sessions/{session_id}/transcribe-audio"))
        .method(Method::POST)
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=xxBOUNDARYxx",
        )
        .body(Body::from(body_text))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"], "transcription unavailable");
}
