//! Session protocol state machine.
//!
//! Validates inbound envelopes, mutates the registry, recomputes summaries
//! and drives hub broadcasts. Everything a connection or REST handler does
//! to a live session goes through here.
//!
//! A malformed envelope earns the sender a unicast `error` event and leaves
//! state untouched; it never resets the connection. Collaborator failures
//! degrade to safe defaults. Termination is asymmetric: an explicit end
//! broadcasts `session_ended`, while destruction after the last participant
//! leaves is silent since nobody remains to receive it.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::llm::{ChatLine, ChatSentiment, LlmClient, SessionDigest};
use crate::store::SessionStore;
use crate::ws::hub::{ConnectionHub, ConnectionId};
use crate::ws::types::{ClientEnvelope, ServerEvent, SessionMeta, SttTogglePayload};

use super::aggregator::{self, SessionSummary};
use super::error::{SessionError, SessionResult};
use super::models::{Chat, Participant, Session, Signal, TranscriptEntry};
use super::registry::SessionRegistry;

/// Display name given to participants first seen through a connection.
const GUEST_DISPLAY_NAME: &str = "Guest";

/// Coordinator for session lifecycle and the duplex protocol.
pub struct SessionController {
    registry: Arc<SessionRegistry>,
    hub: Arc<ConnectionHub>,
    llm: Arc<LlmClient>,
    store: Option<Arc<SessionStore>>,
}

impl SessionController {
    /// Create a new controller.
    pub fn new(
        registry: Arc<SessionRegistry>,
        hub: Arc<ConnectionHub>,
        llm: Arc<LlmClient>,
        store: Option<Arc<SessionStore>>,
    ) -> Self {
        Self {
            registry,
            hub,
            llm,
            store,
        }
    }

    /// The session registry this controller mutates.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The connection hub this controller broadcasts through.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Handle a new duplex connection.
    ///
    /// Registers the connection, upserts the participant (unseen ids get a
    /// guest display name) and unicasts the initial snapshot. Returns the
    /// connection id and the event receiver the send task drains.
    pub async fn on_connect(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> SessionResult<(ConnectionId, mpsc::Receiver<ServerEvent>)> {
        let (connection_id, rx) = self.hub.register(session_id);

        let snapshot = self
            .registry
            .with_session(session_id, |session| {
                if !session.participants.contains_key(participant_id) {
                    session.participants.insert(
                        participant_id.to_string(),
                        Participant::new(participant_id, GUEST_DISPLAY_NAME),
                    );
                }
                Ok(ServerEvent::SessionInit {
                    session: SessionMeta {
                        id: session.session_id.clone(),
                        name: session.name.clone(),
                        host_id: session.host_id.clone(),
                        host_display_name: session.host_display_name.clone(),
                    },
                    participants: session.participant_names(),
                    summary: aggregator::summarize(&session.participants),
                    stt_enabled: session.stt_enabled,
                    transcript: session.recent_transcript().to_vec(),
                })
            })
            .await;

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Session vanished between the upgrade check and now.
                self.hub.unregister(session_id, connection_id);
                return Err(e);
            }
        };

        self.hub.send_to(session_id, connection_id, snapshot).await;
        info!(
            "Participant {} connected to session {} (connection {})",
            participant_id, session_id, connection_id
        );
        Ok((connection_id, rx))
    }

    /// Handle one raw inbound envelope from a connection.
    ///
    /// Envelopes from a single connection are processed strictly in receipt
    /// order by the calling receive loop. This never returns an error: every
    /// failure mode answers the sender with an `error` event instead.
    pub async fn handle_envelope(
        &self,
        session_id: &str,
        participant_id: &str,
        connection_id: ConnectionId,
        raw: &str,
    ) {
        let envelope: ClientEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(
                    "Malformed envelope from {} on session {}: {}",
                    participant_id, session_id, e
                );
                self.reply_error(session_id, connection_id, format!("invalid envelope: {e}"))
                    .await;
                return;
            }
        };

        match envelope.kind.as_str() {
            "signal" => {
                self.handle_signal(session_id, participant_id, connection_id, envelope)
                    .await
            }
            "chat" => {
                self.handle_chat(session_id, participant_id, connection_id, envelope)
                    .await
            }
            "stt_toggle" => {
                self.handle_stt_toggle(session_id, connection_id, envelope)
                    .await
            }
            other => {
                self.reply_error(
                    session_id,
                    connection_id,
                    format!("Unknown event type: {other}"),
                )
                .await;
            }
        }
    }

    async fn handle_signal(
        &self,
        session_id: &str,
        participant_id: &str,
        connection_id: ConnectionId,
        envelope: ClientEnvelope,
    ) {
        let signal: Signal = match serde_json::from_value(envelope.payload) {
            Ok(signal) => signal,
            Err(e) => {
                self.reply_error(session_id, connection_id, format!("invalid signal: {e}"))
                    .await;
                return;
            }
        };
        if let Err(e) = signal.validate() {
            self.reply_error(session_id, connection_id, e.to_string())
                .await;
            return;
        }

        // Replace the signal and recompute the summary under one lock so the
        // broadcast summary matches the state it was derived from.
        let update = self
            .registry
            .with_session(session_id, |session| {
                let participant = session
                    .participants
                    .get_mut(participant_id)
                    .ok_or_else(|| SessionError::participant_not_found(participant_id))?;
                participant.latest_signal = Some(signal.clone());
                let display_name = participant.display_name.clone();
                Ok((display_name, aggregator::summarize(&session.participants)))
            })
            .await;

        match update {
            Ok((display_name, summary)) => {
                self.hub
                    .broadcast(
                        session_id,
                        ServerEvent::SessionUpdate {
                            participant_id: participant_id.to_string(),
                            display_name,
                            signal,
                            summary,
                        },
                    )
                    .await;
            }
            Err(e) => {
                self.reply_error(session_id, connection_id, e.to_string())
                    .await;
            }
        }
    }

    async fn handle_chat(
        &self,
        session_id: &str,
        participant_id: &str,
        connection_id: ConnectionId,
        envelope: ClientEnvelope,
    ) {
        let chat: Chat = match serde_json::from_value(envelope.payload) {
            Ok(chat) => chat,
            Err(e) => {
                self.reply_error(session_id, connection_id, format!("invalid chat: {e}"))
                    .await;
                return;
            }
        };
        if let Err(e) = chat.validate() {
            self.reply_error(session_id, connection_id, e.to_string())
                .await;
            return;
        }

        if let Err(e) = self
            .registry
            .append_chat(session_id, participant_id, chat.clone())
            .await
        {
            self.reply_error(session_id, connection_id, e.to_string())
                .await;
            return;
        }

        let sentiment = match self.llm.analyze_chat_sentiment(&chat.message).await {
            Ok(sentiment) => sentiment,
            Err(e) => {
                warn!("Chat sentiment analysis unavailable, using defaults: {e}");
                ChatSentiment::neutral()
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store
                .save_chat(session_id, participant_id, &chat.message, chat.timestamp)
                .await
            {
                warn!("Failed to persist chat for session {}: {:?}", session_id, e);
            }
        }

        self.hub
            .broadcast(
                session_id,
                ServerEvent::Chat {
                    participant_id: participant_id.to_string(),
                    message: chat.message,
                    timestamp: chat.timestamp,
                    sentiment: round3(sentiment.sentiment),
                    emotion: sentiment.emotion,
                    confidence: round3(sentiment.confidence),
                },
            )
            .await;
    }

    async fn handle_stt_toggle(
        &self,
        session_id: &str,
        connection_id: ConnectionId,
        envelope: ClientEnvelope,
    ) {
        let payload: SttTogglePayload =
            serde_json::from_value(envelope.payload).unwrap_or_default();

        match self
            .registry
            .set_stt_enabled(session_id, payload.enabled)
            .await
        {
            Ok(enabled) => {
                self.hub
                    .broadcast(session_id, ServerEvent::SttToggle { enabled })
                    .await;
            }
            Err(e) => {
                self.reply_error(session_id, connection_id, e.to_string())
                    .await;
            }
        }
    }

    /// Handle a connection closing, voluntarily or on error.
    ///
    /// Removes the participant, notifies the room, and silently destroys the
    /// session when the last participant is gone.
    pub async fn on_disconnect(
        &self,
        session_id: &str,
        participant_id: &str,
        connection_id: ConnectionId,
    ) {
        self.hub.unregister(session_id, connection_id);

        let Some(remaining) = self
            .registry
            .remove_participant(session_id, participant_id)
            .await
        else {
            return;
        };

        info!(
            "Participant {} disconnected from session {} ({} remaining)",
            participant_id, session_id, remaining
        );
        self.hub
            .broadcast(
                session_id,
                ServerEvent::ParticipantLeft {
                    participant_id: participant_id.to_string(),
                },
            )
            .await;

        if remaining == 0 {
            self.registry.remove(session_id);
            self.hub.close_all(session_id);
        }
    }

    /// Add a participant on behalf of the REST join endpoint and notify the
    /// room.
    pub async fn join(
        &self,
        session_id: &str,
        participant_id: Option<String>,
        display_name: &str,
    ) -> SessionResult<String> {
        let (participant_id, _) = self
            .registry
            .add_participant(session_id, participant_id, display_name)
            .await?;

        self.hub
            .broadcast(
                session_id,
                ServerEvent::ParticipantJoined {
                    participant_id: participant_id.clone(),
                    display_name: display_name.to_string(),
                },
            )
            .await;

        Ok(participant_id)
    }

    /// Explicitly end a session.
    ///
    /// Stamps the end time, persists the final state (best effort),
    /// broadcasts `session_ended` with the final summary, then closes every
    /// connection and drops the registry entry.
    pub async fn end_session(&self, session_id: &str) -> SessionResult<SessionSummary> {
        let session = self.registry.end(session_id).await?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save_session(&session).await {
                warn!(
                    "Failed to persist final state for session {}: {:?}",
                    session_id, e
                );
            }
        }

        let summary = aggregator::summarize(&session.participants);
        self.hub
            .broadcast(
                session_id,
                ServerEvent::SessionEnded {
                    session_id: session_id.to_string(),
                    host_id: session.host_id.clone(),
                    summary: summary.clone(),
                },
            )
            .await;
        self.hub.close_all(session_id);

        Ok(summary)
    }

    /// Append a transcript entry and notify the room.
    pub async fn add_transcript_entry(
        &self,
        session_id: &str,
        entry: TranscriptEntry,
    ) -> SessionResult<()> {
        self.registry
            .append_transcript(session_id, entry.clone())
            .await?;
        self.hub
            .broadcast(session_id, ServerEvent::Transcript(entry))
            .await;
        Ok(())
    }

    /// Build the condensed digest the meeting-summary generator consumes.
    pub async fn session_digest(&self, session_id: &str) -> SessionResult<SessionDigest> {
        let session = self.registry.get(session_id).await?;
        Ok(build_digest(&session))
    }

    async fn reply_error(
        &self,
        session_id: &str,
        connection_id: ConnectionId,
        message: String,
    ) {
        self.hub
            .send_to(session_id, connection_id, ServerEvent::Error { message })
            .await;
    }
}

fn build_digest(session: &Session) -> SessionDigest {
    let summary = aggregator::summarize(&session.participants);
    let ended = session.ended_at.unwrap_or_else(chrono::Utc::now);
    let duration_seconds = (ended - session.created_at).num_milliseconds() as f64 / 1000.0;

    let mut chat: Vec<(chrono::DateTime<chrono::Utc>, ChatLine)> = session
        .participants
        .values()
        .flat_map(|p| {
            p.chat_history.iter().map(|c| {
                (
                    c.timestamp,
                    ChatLine {
                        speaker: p.display_name.clone(),
                        message: c.message.clone(),
                    },
                )
            })
        })
        .collect();
    chat.sort_by_key(|(timestamp, _)| *timestamp);

    SessionDigest {
        name: session.name.clone(),
        duration_seconds: duration_seconds.max(0.0),
        participants: session.participants.len(),
        engagement: summary.engagement,
        confusion: summary.confusion,
        stress: summary.stress,
        chat: chat.into_iter().map(|(_, line)| line).collect(),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
