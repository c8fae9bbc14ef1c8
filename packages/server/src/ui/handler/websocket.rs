//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::{
    sync::mpsc,
    time::{Instant, interval_at, timeout},
};

use crate::{
    domain::{ConnectionId, Identity},
    infrastructure::dto::{
        http::JoinRequestDto,
        websocket::{ClientMessage, MemberDto, MessageDto, ServerMessage},
    },
    ui::{
        extract::{AuthenticatedUser, parse_channel},
        state::AppState,
    },
    usecase::{ChatEngine, ChatError, ChatEvent},
};

/// Upgrade an authenticated request to a WebSocket session.
///
/// Requests without identity headers are refused with 401 by the extractor.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    // Create a channel for this connection to receive events
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChatEvent>();
    let connection_id = match state.engine.on_connect(identity.clone(), event_tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(user_id = %identity.id, error = %e, "connection refused");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::info!(%connection_id, user_id = %identity.id, "WebSocket connected");

    // Replies to this connection's own requests
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let heartbeat_interval = state.settings.heartbeat_interval;
    let client_timeout = state.settings.client_timeout;

    // Spawn a task to forward events, replies and pings to the client
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        loop {
            let outbound = tokio::select! {
                Some(event) = event_rx.recv() => Some(event_frame(event)),
                Some(reply) = reply_rx.recv() => Some(reply),
                _ = heartbeat.tick() => None,
                else => break,
            };
            let frame = match outbound {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::error!("Failed to serialize frame: {}", e);
                        continue;
                    }
                },
                None => Message::Ping(Bytes::new()),
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let engine = state.engine.clone();
    let reader_identity = identity.clone();

    // Spawn a task to receive frames from this client
    let mut recv_task = tokio::spawn(async move {
        loop {
            // any inbound frame, pongs included, proves liveness
            let msg = match timeout(client_timeout, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::warn!(%connection_id, "WebSocket error: {}", e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::info!(%connection_id, "client timed out");
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let reply =
                        dispatch(&engine, &reader_identity, &connection_id, text.as_str()).await;
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                Message::Binary(_) => {
                    let reply = error_frame(
                        "message",
                        &ChatError::Validation("binary frames are not supported".to_string()),
                    );
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::trace!(%connection_id, "heartbeat");
                }
                Message::Close(_) => {
                    tracing::info!(%connection_id, "client requested close");
                    break;
                }
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    let left = state.engine.on_disconnect(&connection_id).await;
    tracing::info!(
        %connection_id,
        user_id = %identity.id,
        channels = left.len(),
        "WebSocket disconnected"
    );
}

/// Handle one inbound text frame and build the reply.
async fn dispatch(
    engine: &ChatEngine,
    identity: &Identity,
    connection_id: &ConnectionId,
    text: &str,
) -> ServerMessage {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(%connection_id, "Failed to parse frame: {}", e);
            return error_frame(
                "message",
                &ChatError::Validation(format!("malformed frame: {e}")),
            );
        }
    };

    let action = request.action();
    match handle_request(engine, identity, connection_id, request).await {
        Ok(reply) => reply,
        Err(err) => {
            tracing::debug!(%connection_id, action, reason = err.code(), "action rejected");
            error_frame(action, &err)
        }
    }
}

async fn handle_request(
    engine: &ChatEngine,
    identity: &Identity,
    connection_id: &ConnectionId,
    request: ClientMessage,
) -> Result<ServerMessage, ChatError> {
    match request {
        ClientMessage::Join {
            room_id,
            invite_code,
        } => {
            let outcome = engine
                .join(connection_id, parse_channel(room_id)?, invite_code)
                .await?;
            Ok(ServerMessage::Joined {
                room_id: outcome
                    .channel
                    .room_id()
                    .map(|id| id.as_str().to_string()),
                member_count: outcome.member_count,
                members: outcome
                    .members
                    .map(|members| members.iter().map(MemberDto::from).collect()),
            })
        }
        ClientMessage::Leave { room_id } => {
            let room_id = parse_channel(room_id)?;
            engine.leave(connection_id, room_id.clone()).await;
            Ok(ServerMessage::Left {
                room_id: room_id.map(|id| id.into_string()),
            })
        }
        ClientMessage::Send { room_id, body } => {
            let message = engine
                .send(identity, parse_channel(room_id)?, body)
                .await?;
            Ok(ServerMessage::Sent {
                message: MessageDto::from(&message),
            })
        }
        ClientMessage::History { room_id, limit } => {
            let room_id = parse_channel(room_id)?;
            let messages = engine
                .list_recent_messages(&identity.id, room_id.clone(), limit)
                .await?;
            Ok(ServerMessage::History {
                room_id: room_id.map(|id| id.into_string()),
                messages: messages.iter().map(MessageDto::from).collect(),
            })
        }
    }
}

fn error_frame(action: &str, err: &ChatError) -> ServerMessage {
    ServerMessage::Error {
        action: action.to_string(),
        reason: err.code().to_string(),
        message: err.to_string(),
    }
}

/// Render a pushed event as a wire frame.
fn event_frame(event: ChatEvent) -> ServerMessage {
    match event {
        ChatEvent::Message(message) => ServerMessage::Message {
            message: MessageDto::from(&message),
        },
        ChatEvent::MemberCount { channel, count } => ServerMessage::MemberCount {
            room_id: channel.room_id().map(|id| id.as_str().to_string()),
            count,
        },
        ChatEvent::MemberListUpdate { channel, members } => ServerMessage::MemberListUpdate {
            room_id: channel.room_id().map(|id| id.as_str().to_string()),
            members: members.iter().map(MemberDto::from).collect(),
        },
        ChatEvent::KickedFromRoom { room_id } => ServerMessage::KickedFromRoom {
            room_id: room_id.into_string(),
        },
        ChatEvent::JoinRequestReceived { room_name, request } => {
            ServerMessage::JoinRequestReceived {
                room_name: room_name.as_str().to_string(),
                request: JoinRequestDto::from(&request),
            }
        }
        ChatEvent::JoinRequestStatus { room_name, request } => ServerMessage::JoinRequestStatus {
            room_name: room_name.as_str().to_string(),
            request: JoinRequestDto::from(&request),
        },
    }
}
