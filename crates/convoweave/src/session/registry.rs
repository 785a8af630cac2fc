//! In-memory session registry.
//!
//! Single source of truth for which sessions exist and their participant
//! membership. Every session sits behind its own `tokio::sync::Mutex`, so
//! mutations on one session are serialized while operations on different
//! sessions proceed concurrently. The registry performs no I/O.

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::{SessionError, SessionResult};
use super::models::{Chat, CreateSessionRequest, Participant, Session, Signal, TranscriptEntry};

/// Registry of live sessions keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether any session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of every live session.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Create a new session with a fresh unique id. Always succeeds.
    pub fn create(&self, request: CreateSessionRequest) -> Session {
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            name: request.name,
            created_at: Utc::now(),
            ended_at: None,
            host_id: request.host_id,
            host_display_name: request.host_display_name,
            stt_enabled: false,
            transcript: Vec::new(),
            participants: Default::default(),
        };
        info!("Created session {} ({})", session.session_id, session.name);
        self.sessions.insert(
            session.session_id.clone(),
            Arc::new(Mutex::new(session.clone())),
        );
        session
    }

    /// Run `f` under the session's exclusive lock.
    ///
    /// This is the keyed exclusive-access scope every mutation goes through;
    /// callers that need to mutate and derive a result atomically (e.g.
    /// update a signal and recompute the summary) use it directly.
    pub async fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> SessionResult<T>,
    ) -> SessionResult<T> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        f(&mut session)
    }

    /// Get a snapshot of the current session state.
    pub async fn get(&self, session_id: &str) -> SessionResult<Session> {
        self.with_session(session_id, |session| Ok(session.clone()))
            .await
    }

    /// Add a participant, generating an id when none is supplied.
    ///
    /// The upsert is idempotent: joining with an existing id updates the
    /// display name without creating a second entry. Returns the participant
    /// id and whether the participant is new to the session.
    pub async fn add_participant(
        &self,
        session_id: &str,
        participant_id: Option<String>,
        display_name: &str,
    ) -> SessionResult<(String, bool)> {
        let participant_id = participant_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let display_name = display_name.to_string();
        self.with_session(session_id, move |session| {
            let joined = match session.participants.get_mut(&participant_id) {
                Some(existing) => {
                    existing.display_name = display_name;
                    false
                }
                None => {
                    session.participants.insert(
                        participant_id.clone(),
                        Participant::new(participant_id.clone(), display_name),
                    );
                    true
                }
            };
            debug!(
                "Participant {} {} session {}",
                participant_id,
                if joined { "joined" } else { "rejoined" },
                session.session_id
            );
            Ok((participant_id, joined))
        })
        .await
    }

    /// Remove a participant. No-op when either key is absent.
    ///
    /// Returns the remaining participant count when a participant was
    /// actually removed; the caller decides whether to destroy an emptied
    /// session.
    pub async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Option<usize> {
        let result = self
            .with_session(session_id, |session| {
                if session.participants.remove(participant_id).is_none() {
                    return Ok(None);
                }
                Ok(Some(session.participants.len()))
            })
            .await;

        match result {
            Ok(removed) => removed,
            Err(_) => None,
        }
    }

    /// Replace a participant's latest signal.
    pub async fn update_signal(
        &self,
        session_id: &str,
        participant_id: &str,
        signal: Signal,
    ) -> SessionResult<()> {
        self.with_session(session_id, move |session| {
            let participant = session
                .participants
                .get_mut(participant_id)
                .ok_or_else(|| SessionError::participant_not_found(participant_id))?;
            participant.latest_signal = Some(signal);
            Ok(())
        })
        .await
    }

    /// Append a chat message to a participant's history.
    pub async fn append_chat(
        &self,
        session_id: &str,
        participant_id: &str,
        chat: Chat,
    ) -> SessionResult<()> {
        self.with_session(session_id, move |session| {
            let participant = session
                .participants
                .get_mut(participant_id)
                .ok_or_else(|| SessionError::participant_not_found(participant_id))?;
            participant.chat_history.push(chat);
            Ok(())
        })
        .await
    }

    /// Set the live-transcription flag, returning the new value.
    pub async fn set_stt_enabled(&self, session_id: &str, enabled: bool) -> SessionResult<bool> {
        self.with_session(session_id, move |session| {
            session.stt_enabled = enabled;
            Ok(enabled)
        })
        .await
    }

    /// Append an entry to the session transcript.
    pub async fn append_transcript(
        &self,
        session_id: &str,
        entry: TranscriptEntry,
    ) -> SessionResult<()> {
        self.with_session(session_id, move |session| {
            session.transcript.push(entry);
            Ok(())
        })
        .await
    }

    /// End a session: stamp `ended_at`, drop the registry entry, and return
    /// the final state. The id resolves to NotFound from then on and is
    /// never reused.
    pub async fn end(&self, session_id: &str) -> SessionResult<Session> {
        let (_, handle) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::session_not_found(session_id))?;
        let mut session = handle.lock().await;
        session.ended_at = Some(Utc::now());
        info!("Ended session {}", session_id);
        Ok(session.clone())
    }

    /// Silently destroy a session (empty-room cleanup). No-op when absent.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!("Destroyed session {} (no participants remain)", session_id);
        }
        removed
    }

    fn handle(&self, session_id: &str) -> SessionResult<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SessionError::session_not_found(session_id))
    }
}
