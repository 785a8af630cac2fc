//! WebSocket handler for session duplex connections.

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiError, AppState};
use crate::session::SessionController;

/// Interval between protocol-level keepalive pings.
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler.
///
/// GET /ws/{session_id}/{participant_id}
pub async fn ws_handler(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Reject unknown sessions before upgrading.
    state.controller.registry().get(&session_id).await?;

    info!(
        "WebSocket upgrade for participant {} on session {}",
        participant_id, session_id
    );
    let controller = state.controller.clone();
    Ok(ws.on_upgrade(move |socket| {
        handle_ws_connection(socket, controller, session_id, participant_id)
    }))
}

/// Handle a WebSocket connection.
async fn handle_ws_connection(
    socket: WebSocket,
    controller: Arc<SessionController>,
    session_id: String,
    participant_id: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Register with the hub and upsert the participant; the snapshot is
    // queued for us before any later event.
    let (connection_id, mut event_rx) =
        match controller.on_connect(&session_id, &participant_id).await {
            Ok(registered) => registered,
            Err(e) => {
                warn!(
                    "Rejecting connection for participant {} on session {}: {}",
                    participant_id, session_id, e
                );
                let _ = sender.close().await;
                return;
            }
        };

    // Send task: drain the outbound event queue onto the socket.
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        // Queue closed: the hub dropped this connection.
                        break;
                    };
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }

                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sender.close().await;
    });

    // Receive loop: envelopes from one connection process strictly in
    // receipt order.
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                controller
                    .handle_envelope(&session_id, &participant_id, connection_id, text.as_str())
                    .await;
            }
            Ok(Message::Binary(_)) => {
                debug!(
                    "Ignoring binary message from participant {} on session {}",
                    participant_id, session_id
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("Keepalive from participant {}", participant_id);
            }
            Ok(Message::Close(_)) => {
                info!(
                    "Participant {} closed connection to session {}",
                    participant_id, session_id
                );
                break;
            }
            Err(e) => {
                warn!(
                    "WebSocket error for participant {} on session {}: {}",
                    participant_id, session_id, e
                );
                break;
            }
        }
    }

    // Closing the connection cancels its receive loop only; in-flight
    // broadcasts to other connections are unaffected.
    send_task.abort();
    controller
        .on_disconnect(&session_id, &participant_id, connection_id)
        .await;
}
