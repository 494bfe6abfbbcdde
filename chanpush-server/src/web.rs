//! HTTP and websocket endpoints.
//!
//! - `GET /channels/`: channel list, in configured order.
//! - `GET /ws/{channel}`: subscribe to one channel. Every text frame a
//!   subscriber sends is broadcast to the whole channel as `"{channel}: {text}"`.
//! - `GET /{client_id}`: join the global room, echoing `"Client {id}: {text}"`.
//! - `POST /send-message/`, `POST /users/send-message/`: server-side broadcast.
//! - `GET /push/subscribe`, `POST /push/`: push relay for background listeners.
//!
//! An event goes out through socket fan-out or through the push relay, never
//! both. Clients rely on that to avoid double notifications.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::server::{Fanout, SharedState};

/// Build the axum router.
pub fn router(state: Arc<SharedState>, config: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/channels/", get(list_channels))
        .route("/channels", get(list_channels))
        .route("/health", get(health))
        .route("/ws/{channel}", get(channel_upgrade))
        .route("/{client_id}", get(room_upgrade))
        .route("/send-message/", post(send_message))
        .route("/users/send-message/", post(send_room_message))
        .route("/push/subscribe", get(push_upgrade))
        .route("/push/", post(push))
        .with_state(state);
    if config.cors_any {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

// ── Request / response types ───────────────────────────────────────────

#[derive(Serialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    connections: usize,
    channels: usize,
    push_listeners: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RoomMessage {
    pub message: String,
}

#[derive(Serialize)]
struct Ack {
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

fn channel_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            detail: "Channel not found".to_string(),
        }),
    )
        .into_response()
}

// ── REST handlers ──────────────────────────────────────────────────────

async fn list_channels(State(state): State<Arc<SharedState>>) -> Json<ChannelsResponse> {
    Json(ChannelsResponse {
        channels: state.channels.clone(),
    })
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        connections: state.connection_count(),
        channels: state.channels.len(),
        push_listeners: state.push_listeners.len(),
    })
}

async fn send_message(
    State(state): State<Arc<SharedState>>,
    Json(msg): Json<ChannelMessage>,
) -> Response {
    let Some(fanout) = state.channel(&msg.channel) else {
        return channel_not_found();
    };
    let delivered = fanout.broadcast(&format!("Broadcast to {}: {}", msg.channel, msg.message));
    tracing::info!(channel = %msg.channel, delivered, "server broadcast");
    Json(Ack {
        message: format!("Message sent to {}", msg.channel),
    })
    .into_response()
}

async fn send_room_message(
    State(state): State<Arc<SharedState>>,
    Query(msg): Query<RoomMessage>,
) -> Json<Ack> {
    let delivered = state.room.broadcast(&format!("Broadcast: {}", msg.message));
    tracing::info!(delivered, "room broadcast");
    Json(Ack {
        message: "Message sent to all clients".to_string(),
    })
}

/// Relay the body verbatim. The push service does not look inside payloads.
async fn push(State(state): State<Arc<SharedState>>, body: String) -> Json<Ack> {
    let delivered = state.push_listeners.broadcast(&body);
    tracing::info!(delivered, bytes = body.len(), "push relayed");
    Json(Ack {
        message: format!("Push sent to {delivered} listeners"),
    })
}

// ── WebSocket handlers ─────────────────────────────────────────────────

/// What a socket is attached to, and how its inbound text is relayed.
#[derive(Debug, Clone)]
enum Membership {
    Channel(String),
    Room(u64),
    Push,
}

impl Membership {
    fn fanout<'a>(&self, state: &'a SharedState) -> Option<&'a Fanout> {
        match self {
            Membership::Channel(name) => state.channel(name),
            Membership::Room(_) => Some(&state.room),
            Membership::Push => Some(&state.push_listeners),
        }
    }

    /// Line to broadcast for inbound `text`, or `None` to ignore it.
    fn relay(&self, text: &str) -> Option<String> {
        match self {
            Membership::Channel(name) => Some(format!("{name}: {text}")),
            Membership::Room(id) => Some(format!("Client {id}: {text}")),
            Membership::Push => None,
        }
    }
}

async fn channel_upgrade(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<Arc<SharedState>>,
) -> Response {
    if state.channel(&channel).is_none() {
        tracing::debug!(%channel, "rejecting subscription to unknown channel");
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, Membership::Channel(channel)))
        .into_response()
}

async fn room_upgrade(
    ws: WebSocketUpgrade,
    Path(client_id): Path<u64>,
    State(state): State<Arc<SharedState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Membership::Room(client_id)))
        .into_response()
}

async fn push_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<SharedState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Membership::Push))
        .into_response()
}

/// Run one socket: a writer task drains the member's queue while this task
/// reads inbound frames and broadcasts them.
async fn handle_socket(socket: WebSocket, state: Arc<SharedState>, membership: Membership) {
    let Some(fanout) = membership.fanout(&state) else {
        return;
    };
    let session = state.next_session_id();
    let (tx, mut rx) = mpsc::channel::<String>(state.socket_queue);
    fanout.join(session, tx);
    tracing::debug!(session, ?membership, "socket joined");

    let (mut sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(line) = membership.relay(text.as_str()) {
                        fanout.broadcast(&line);
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session, "socket read error: {e}");
                    break;
                }
            },
            // Writer gave up: the peer is gone.
            _ = &mut writer => break,
        }
    }

    fanout.leave(session);
    writer.abort();
    tracing::debug!(session, ?membership, "socket left");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_formats() {
        assert_eq!(
            Membership::Channel("tech".into()).relay("hi").as_deref(),
            Some("tech: hi")
        );
        assert_eq!(
            Membership::Room(123).relay("hi").as_deref(),
            Some("Client 123: hi")
        );
        assert_eq!(Membership::Push.relay("hi"), None);
    }
}
