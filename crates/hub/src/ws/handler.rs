use super::{HubState, HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS, MAX_FRAME_BYTES};
use crate::error::{
    current_request_id, error_event, request_id_from_headers_or_generate, with_request_id_scope,
    ErrorCode,
};
use crate::fanout::{self, InboundMessage};
use crate::rooms::ConnectionId;
use crate::signaling;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use huddle_common::protocol::ws::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

pub fn router(state: HubState) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

pub async fn ws_upgrade(
    State(state): State<HubState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_FRAME_BYTES as usize).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(state, socket)).await;
    })
}

pub fn decode_event(raw: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str::<ClientEvent>(raw)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let encoded = encode_event(event).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

/// How long a connection may stay silent before the heartbeat loop
/// drops it: one full ping interval plus the pong grace, so a fresh
/// connection always sees at least one ping before the check can fail.
pub(crate) fn idle_disconnect_threshold() -> std::time::Duration {
    std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS + HEARTBEAT_TIMEOUT_MS)
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: frame_size_exceeded_reason().into(),
        })))
        .await;
}

async fn handle_socket(state: HubState, mut socket: WebSocket) {
    let connection_id: ConnectionId = Uuid::new_v4();
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<ServerEvent>();
    state.rooms.register(connection_id, outbound_sender).await;

    // The user this connection identified as via `user-join`, for
    // presence cleanup on abrupt disconnect.
    let mut identified_user: Option<Uuid> = None;

    // Heartbeat: server pings every HEARTBEAT_INTERVAL_MS. Browser
    // clients cannot originate pings, so any inbound frame counts as
    // liveness; the connection is dropped once nothing has arrived for
    // a full interval plus the HEARTBEAT_TIMEOUT_MS pong grace.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset(); // skip immediate first tick
    let mut last_activity = Instant::now();
    let idle_timeout = idle_disconnect_threshold();

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(
                        connection_id = %connection_id,
                        request_id = %request_id,
                        "heartbeat timeout, disconnecting"
                    );
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound_event) => {
                        if send_event(&mut socket, &outbound_event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        last_activity = Instant::now();
                        if raw_message.len() > MAX_FRAME_BYTES as usize {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }

                        let inbound = match decode_event(&raw_message) {
                            Ok(event) => event,
                            Err(_) => {
                                let reply = error_event(
                                    ErrorCode::InvalidEvent,
                                    ErrorCode::InvalidEvent.default_message(),
                                );
                                if send_event(&mut socket, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        dispatch(&state, connection_id, &mut identified_user, inbound).await;
                    }
                    Ok(Message::Ping(payload)) => {
                        last_activity = Instant::now();
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_activity = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        if is_frame_size_violation(&error) {
                            close_frame_too_large(&mut socket).await;
                        }
                        break;
                    }
                }
            }
        }
    }

    disconnect_cleanup(&state, connection_id, identified_user).await;
}

/// Route one inbound event to its handler. Handler failures are logged
/// and the event is dropped; nothing here may tear the loop down.
pub(crate) async fn dispatch(
    state: &HubState,
    connection_id: ConnectionId,
    identified_user: &mut Option<Uuid>,
    event: ClientEvent,
) {
    match event {
        // Presence broadcasts fire only on real transitions: the first
        // connection takes a user online, the last one takes them
        // offline. Extra tabs for an already-online user join and
        // leave silently, so peers see one `user-join`/`user-leave`
        // pair per session rather than one per tab.
        ClientEvent::UserJoin { id, is_online } => {
            *identified_user = Some(id);
            let came_online = state.presence.join(id, connection_id).await;
            state.rooms.join(connection_id, &id.to_string()).await;
            if let Err(error) = state.store.update_presence_status(id, is_online).await {
                warn!(error = ?error, user_id = %id, "failed to persist presence status");
            }
            if came_online {
                state.rooms.broadcast_to_all(ServerEvent::UserJoin { id, is_online }).await;
            }
        }
        ClientEvent::UserLeave { id, is_online } => {
            let went_offline = state.presence.leave(id, connection_id).await;
            state.rooms.leave(connection_id, &id.to_string()).await;
            if let Err(error) = state.store.update_presence_status(id, is_online).await {
                warn!(error = ?error, user_id = %id, "failed to persist presence status");
            }
            if went_offline {
                state.rooms.broadcast_to_all(ServerEvent::UserLeave { id, is_online }).await;
            }
        }
        ClientEvent::ChannelOpen { id, user_id } => {
            if let Err(error) =
                fanout::handle_channel_open(&state.store, &state.rooms, connection_id, id, user_id)
                    .await
            {
                warn!(error = ?error, "channel-open failed");
            }
        }
        ClientEvent::ConvoOpen { id, user_id } => {
            if let Err(error) =
                fanout::handle_convo_open(&state.store, &state.rooms, connection_id, id, user_id)
                    .await
            {
                warn!(error = ?error, "convo-open failed");
            }
        }
        ClientEvent::Message {
            channel_id,
            channel_name,
            conversation_id,
            collaborators,
            is_self,
            message,
            organisation,
            has_not_open,
        } => {
            let inbound = InboundMessage {
                channel_id,
                channel_name,
                conversation_id,
                collaborators,
                is_self,
                message,
                organisation,
                has_not_open,
            };
            if let Err(error) =
                fanout::handle_message(&state.store, &state.rooms, connection_id, inbound).await
            {
                warn!(error = ?error, "message fan-out failed");
            }
        }
        ClientEvent::ThreadMessage { user_id, message_id, message } => {
            if let Err(error) = fanout::handle_thread_message(
                &state.store,
                &state.rooms,
                connection_id,
                user_id,
                message_id,
                message,
            )
            .await
            {
                warn!(error = ?error, message_id = %message_id, "thread-message failed");
            }
        }
        ClientEvent::MessageView { message_id } => {
            if let Err(error) =
                fanout::handle_message_view(&state.store, &state.rooms, message_id).await
            {
                warn!(error = ?error, message_id = %message_id, "message-view failed");
            }
        }
        ClientEvent::Reaction { emoji, id, is_thread, user_id } => {
            if let Err(error) = fanout::handle_reaction(
                &state.store,
                &state.rooms,
                connection_id,
                &emoji,
                id,
                is_thread,
                user_id,
            )
            .await
            {
                warn!(error = ?error, id = %id, "reaction failed");
            }
        }
        ClientEvent::JoinRoom { room_id, user_id } => {
            signaling::handle_join_room(
                &state.rooms,
                &state.signaling,
                connection_id,
                &room_id,
                user_id,
            )
            .await;
        }
        ClientEvent::Offer { offer, target_user_id } => {
            signaling::handle_offer(
                &state.rooms,
                &state.signaling,
                connection_id,
                offer,
                target_user_id,
            )
            .await;
        }
        ClientEvent::Answer { answer, sender_user_id } => {
            signaling::handle_answer(&state.rooms, connection_id, answer, sender_user_id).await;
        }
        ClientEvent::IceCandidate { candidate, target_user_id } => {
            signaling::handle_ice_candidate(
                &state.rooms,
                &state.signaling,
                connection_id,
                candidate,
                target_user_id,
            )
            .await;
        }
        ClientEvent::RoomLeave { room_id, user_id } => {
            signaling::handle_room_leave(
                &state.rooms,
                &state.signaling,
                connection_id,
                &room_id,
                user_id,
            )
            .await;
        }
    }
}

/// Final cleanup after the socket loop exits, whatever the exit path.
/// Rooms first so no later broadcast targets the gone connection.
async fn disconnect_cleanup(
    state: &HubState,
    connection_id: ConnectionId,
    identified_user: Option<Uuid>,
) {
    state.rooms.remove_connection(connection_id).await;
    state.signaling.deregister_connection(connection_id).await;

    let Some((user_id, went_offline)) = state.presence.remove_connection(connection_id).await
    else {
        return;
    };
    if !went_offline {
        return;
    }
    if let Err(error) = state.store.update_presence_status(user_id, false).await {
        warn!(error = ?error, user_id = %user_id, "failed to persist presence status");
    }
    if identified_user.is_some_and(|id| id != user_id) {
        warn!(user_id = %user_id, "presence registry and loop disagree on connection owner");
    }
    state.rooms.broadcast_to_all(ServerEvent::UserLeave { id: user_id, is_online: false }).await;
}
