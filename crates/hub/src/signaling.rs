// WebRTC signaling relay for meeting rooms.
//
// The hub never inspects SDP or ICE payloads; it only routes them.
// Peer addressing goes through a transient users map (user id to the
// connection that joined a meeting room) which lives and dies with the
// sockets. Nothing here is persisted.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_common::protocol::ws::ServerEvent;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::rooms::{ConnectionId, RoomRegistry};

/// user id → signaling connection. One connection per user; a rejoin
/// from another tab takes over the slot.
#[derive(Debug, Clone, Default)]
pub struct SignalingRegistry {
    users: Arc<RwLock<HashMap<Uuid, ConnectionId>>>,
}

impl SignalingRegistry {
    pub async fn register(&self, user_id: Uuid, connection_id: ConnectionId) {
        self.users.write().await.insert(user_id, connection_id);
    }

    pub async fn deregister_user(&self, user_id: Uuid) {
        self.users.write().await.remove(&user_id);
    }

    /// Disconnect cleanup: forget every user slot held by this
    /// connection.
    pub async fn deregister_connection(&self, connection_id: ConnectionId) {
        self.users.write().await.retain(|_, conn| *conn != connection_id);
    }

    pub async fn connection_of(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.users.read().await.get(&user_id).copied()
    }

    /// Reverse lookup used to attribute relayed payloads to a sender.
    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.users
            .read()
            .await
            .iter()
            .find(|(_, conn)| **conn == connection_id)
            .map(|(user, _)| *user)
    }
}

/// `join-room`: enter the meeting room, claim the user's signaling
/// slot, and tell the peers already there.
pub async fn handle_join_room(
    rooms: &RoomRegistry,
    signaling: &SignalingRegistry,
    connection_id: ConnectionId,
    room_id: &str,
    user_id: Uuid,
) {
    rooms.join(connection_id, room_id).await;
    signaling.register(user_id, connection_id).await;
    rooms
        .broadcast_to_room_except(
            room_id,
            connection_id,
            ServerEvent::JoinRoom { room_id: room_id.to_string(), other_user_id: user_id },
        )
        .await;
}

/// `offer`: deliver the SDP offer to the target peer's connection only.
/// Unknown targets are dropped silently.
pub async fn handle_offer(
    rooms: &RoomRegistry,
    signaling: &SignalingRegistry,
    connection_id: ConnectionId,
    offer: serde_json::Value,
    target_user_id: Uuid,
) {
    let Some(sender_user_id) = signaling.user_of(connection_id).await else {
        debug!(%target_user_id, "offer from connection outside any meeting room, dropped");
        return;
    };
    let Some(target) = signaling.connection_of(target_user_id).await else {
        debug!(%target_user_id, "offer target not in signaling registry, dropped");
        return;
    };
    rooms.send_to(target, ServerEvent::Offer { offer, sender_user_id }).await;
}

/// `answer`: relayed to every other connection. The answering client
/// names itself in the payload.
pub async fn handle_answer(
    rooms: &RoomRegistry,
    connection_id: ConnectionId,
    answer: serde_json::Value,
    sender_user_id: Uuid,
) {
    rooms
        .broadcast_to_all_except(connection_id, ServerEvent::Answer { answer, sender_user_id })
        .await;
}

/// `ice-candidate`: deliver the candidate to the intended peer's
/// connection. Unknown targets are dropped silently.
pub async fn handle_ice_candidate(
    rooms: &RoomRegistry,
    signaling: &SignalingRegistry,
    connection_id: ConnectionId,
    candidate: serde_json::Value,
    target_user_id: Uuid,
) {
    let Some(sender_user_id) = signaling.user_of(connection_id).await else {
        debug!(%target_user_id, "ice candidate from connection outside any meeting room, dropped");
        return;
    };
    let Some(target) = signaling.connection_of(target_user_id).await else {
        debug!(%target_user_id, "ice candidate target not in signaling registry, dropped");
        return;
    };
    rooms
        .send_to(target, ServerEvent::IceCandidate { candidate, sender_user_id })
        .await;
}

/// `room-leave`: leave the meeting room, release the user's signaling
/// slot, and tell the peers who stayed.
pub async fn handle_room_leave(
    rooms: &RoomRegistry,
    signaling: &SignalingRegistry,
    connection_id: ConnectionId,
    room_id: &str,
    user_id: Uuid,
) {
    rooms.leave(connection_id, room_id).await;
    signaling.deregister_user(user_id).await;
    rooms
        .broadcast_to_room(
            room_id,
            ServerEvent::RoomLeave { room_id: room_id.to_string(), left_user_id: user_id },
        )
        .await;
}
