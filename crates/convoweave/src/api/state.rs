//! Application state shared across handlers.

use std::sync::Arc;

use crate::llm::LlmClient;
use crate::session::{SessionController, SessionRegistry};
use crate::store::SessionStore;
use crate::tts::TtsClient;
use crate::vision::FrameAnalyzer;
use crate::ws::ConnectionHub;

/// Server configuration for the API layer.
#[derive(Clone, Debug)]
pub struct ServerState {
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
    /// Whether the server runs in development mode (relaxed CORS).
    pub dev_mode: bool,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            dev_mode: true,
        }
    }
}

impl ServerState {
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry (source of truth for live sessions).
    pub registry: Arc<SessionRegistry>,
    /// Connection hub for duplex fan-out.
    pub hub: Arc<ConnectionHub>,
    /// Session protocol controller.
    pub controller: Arc<SessionController>,
    /// LLM collaborator (sentiment, tone, transcription, summaries).
    pub llm: Arc<LlmClient>,
    /// Text-to-speech collaborator.
    pub tts: Arc<TtsClient>,
    /// Frame emotion scoring collaborator.
    pub frames: Arc<FrameAnalyzer>,
    /// Best-effort persistence, when storage is enabled.
    pub store: Option<Arc<SessionStore>>,
    /// Server configuration.
    pub server: ServerState,
}

impl AppState {
    /// Create new application state, wiring the controller to a fresh
    /// registry and hub.
    pub fn new(
        llm: LlmClient,
        tts: TtsClient,
        frames: FrameAnalyzer,
        store: Option<SessionStore>,
        server: ServerState,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let hub = Arc::new(ConnectionHub::new());
        let llm = Arc::new(llm);
        let store = store.map(Arc::new);
        let controller = Arc::new(SessionController::new(
            registry.clone(),
            hub.clone(),
            llm.clone(),
            store.clone(),
        ));

        Self {
            registry,
            hub,
            controller,
            llm,
            tts: Arc::new(tts),
            frames: Arc::new(frames),
            store,
            server,
        }
    }
}
