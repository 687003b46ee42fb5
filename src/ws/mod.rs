pub mod admin;
pub mod handlers;
pub mod member;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
}

/// WebSocket upgrade handler.
///
/// `role=admin` has already been checked by the auth middleware.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(role = ?params.role, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = ulid::Ulid::new().to_string();

    let role = match params.role.as_deref() {
        Some("admin") => Role::Admin,
        _ => Role::Member,
    };

    tracing::info!(%conn_id, ?role, "WebSocket connected");

    // Subscribe before taking the snapshot so no update falls in between
    let mut broadcast_rx = state.broadcast.subscribe();
    let snapshot = state.registry.snapshot().await;
    let mut last_seq = snapshot.seq;

    // Send welcome message
    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role: role.clone(),
        queue: snapshot.queue,
        seq: snapshot.seq,
        target: state.get_target().await,
        server_now: chrono::Utc::now().to_rfc3339(),
    };

    if let Ok(msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            tracing::error!(%conn_id, "Failed to send welcome message");
            return;
        }
    }

    // Handle incoming messages and broadcasts
    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                let msg = match broadcast_msg {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        // Slow client: resync with the latest full state
                        tracing::warn!(%conn_id, skipped, "Subscriber lagged, resending queue");
                        let latest = state.registry.snapshot().await;
                        ServerMessage::QueueUpdate {
                            queue: latest.queue,
                            seq: latest.seq,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };

                // Drop updates this client has already seen
                if let ServerMessage::QueueUpdate { seq, .. } = &msg {
                    if *seq <= last_seq {
                        continue;
                    }
                    last_seq = *seq;
                }

                if let Ok(json) = serde_json::to_string(&msg) {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(%conn_id, "Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &role, &state).await
                                {
                                    if let Ok(json) = serde_json::to_string(&response) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            tracing::error!(%conn_id, "Failed to send response");
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!(%conn_id, "Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(%conn_id, "WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(%conn_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(%conn_id, ?role, "WebSocket connection closed");
}
