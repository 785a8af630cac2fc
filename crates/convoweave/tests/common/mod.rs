//! Test utilities and common setup.

use axum::Router;
use convoweave::api::{self, AppState, ServerState};
use convoweave::db::Database;
use convoweave::llm::LlmClient;
use convoweave::store::SessionStore;
use convoweave::tts::TtsClient;
use convoweave::vision::FrameAnalyzer;

/// Create a test application with all services initialized.
///
/// Collaborators run disabled so every AI feature exercises its degraded
/// path; persistence uses an in-memory database.
pub async fn test_app() -> Router {
    let db = Database::in_memory().await.unwrap();
    let store = SessionStore::new(db.pool().clone());

    let state = AppState::new(
        LlmClient::disabled(),
        TtsClient::disabled(),
        FrameAnalyzer::new(),
        Some(store),
        ServerState::default(),
    );
    api::create_router(state)
}
