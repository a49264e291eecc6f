// Room membership and outbound delivery.
//
// A room is a multicast group keyed by an external entity id (channel,
// conversation, thread message, or meeting room) — it holds membership
// only, no business data. Rooms are created implicitly on first join
// and dropped when their last member leaves. All mutation goes through
// this registry; handler code never touches the maps directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use huddle_common::protocol::ws::ServerEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Identifies one live client socket.
pub type ConnectionId = Uuid;

#[derive(Debug, Default)]
struct RoomState {
    /// Outbound channel per live connection. Delivery is fire-and-forget:
    /// a closed receiver just drops the event.
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// Reverse index for disconnect cleanup.
    joined: HashMap<ConnectionId, HashSet<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    state: Arc<RwLock<RoomState>>,
}

impl RoomRegistry {
    /// Register a connection's outbound sender. Must precede any join.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.state.write().await.senders.insert(connection_id, sender);
    }

    /// Add the connection to a room, creating it on first join.
    /// Idempotent: joining twice leaves a single membership.
    pub async fn join(&self, connection_id: ConnectionId, room_id: &str) {
        let mut guard = self.state.write().await;
        guard.rooms.entry(room_id.to_string()).or_default().insert(connection_id);
        guard.joined.entry(connection_id).or_default().insert(room_id.to_string());
    }

    /// Remove the connection from a room. Leaving a room it never
    /// joined is a no-op. Empty rooms are deleted.
    pub async fn leave(&self, connection_id: ConnectionId, room_id: &str) {
        let mut guard = self.state.write().await;
        if let Some(members) = guard.rooms.get_mut(room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                guard.rooms.remove(room_id);
            }
        }
        if let Some(rooms) = guard.joined.get_mut(&connection_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                guard.joined.remove(&connection_id);
            }
        }
    }

    /// Disconnect cleanup: drop the connection from every room it
    /// joined and discard its outbound sender.
    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        let mut guard = self.state.write().await;
        guard.senders.remove(&connection_id);
        let rooms = guard.joined.remove(&connection_id).unwrap_or_default();
        for room_id in rooms {
            if let Some(members) = guard.rooms.get_mut(&room_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    guard.rooms.remove(&room_id);
                }
            }
        }
    }

    /// Deliver an event to every member of the room, the sender's own
    /// connections included (multi-tab clients stay in sync).
    pub async fn broadcast_to_room(&self, room_id: &str, event: ServerEvent) -> usize {
        let recipients = {
            let guard = self.state.read().await;
            let Some(members) = guard.rooms.get(room_id) else {
                return 0;
            };
            members
                .iter()
                .filter_map(|id| guard.senders.get(id).cloned())
                .collect::<Vec<_>>()
        };

        send_all(recipients, event)
    }

    /// Deliver an event to every live connection.
    pub async fn broadcast_to_all(&self, event: ServerEvent) -> usize {
        let recipients = {
            let guard = self.state.read().await;
            guard.senders.values().cloned().collect::<Vec<_>>()
        };

        send_all(recipients, event)
    }

    /// Deliver an event to every live connection except one (the
    /// socket.io `broadcast` semantics used for notifications).
    pub async fn broadcast_to_all_except(
        &self,
        exclude: ConnectionId,
        event: ServerEvent,
    ) -> usize {
        let recipients = {
            let guard = self.state.read().await;
            guard
                .senders
                .iter()
                .filter(|(id, _)| **id != exclude)
                .map(|(_, sender)| sender.clone())
                .collect::<Vec<_>>()
        };

        send_all(recipients, event)
    }

    /// Deliver an event to a single connection, if still live.
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let sender = self.state.read().await.senders.get(&connection_id).cloned();
        match sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver an event to every room member except one connection
    /// (peer notifications in signaling rooms).
    pub async fn broadcast_to_room_except(
        &self,
        room_id: &str,
        exclude: ConnectionId,
        event: ServerEvent,
    ) -> usize {
        let recipients = {
            let guard = self.state.read().await;
            let Some(members) = guard.rooms.get(room_id) else {
                return 0;
            };
            members
                .iter()
                .filter(|id| **id != exclude)
                .filter_map(|id| guard.senders.get(id).cloned())
                .collect::<Vec<_>>()
        };

        send_all(recipients, event)
    }

    pub async fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.state
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.state.read().await.rooms.contains_key(room_id)
    }

    pub async fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        self.state
            .read()
            .await
            .joined
            .get(&connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn send_all(recipients: Vec<mpsc::UnboundedSender<ServerEvent>>, event: ServerEvent) -> usize {
    let mut sent = 0;
    for recipient in recipients {
        if recipient.send(event.clone()).is_ok() {
            sent += 1;
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_event() -> ServerEvent {
        ServerEvent::MessageView { message_id: Uuid::nil() }
    }

    async fn connect(registry: &RoomRegistry) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::default();
        let (conn, _rx) = connect(&registry).await;

        registry.join(conn, "room-1").await;
        registry.join(conn, "room-1").await;
        assert_eq!(registry.members("room-1").await, vec![conn]);

        registry.leave(conn, "room-1").await;
        assert!(registry.members("room-1").await.is_empty());
    }

    #[tokio::test]
    async fn leave_without_join_is_safe() {
        let registry = RoomRegistry::default();
        let (conn, _rx) = connect(&registry).await;
        registry.leave(conn, "never-joined").await;
        assert!(!registry.room_exists("never-joined").await);
    }

    #[tokio::test]
    async fn empty_rooms_are_garbage_collected() {
        let registry = RoomRegistry::default();
        let (a, _rx_a) = connect(&registry).await;
        let (b, _rx_b) = connect(&registry).await;

        registry.join(a, "room-1").await;
        registry.join(b, "room-1").await;
        registry.leave(a, "room-1").await;
        assert!(registry.room_exists("room-1").await);
        registry.leave(b, "room-1").await;
        assert!(!registry.room_exists("room-1").await);
    }

    #[tokio::test]
    async fn room_broadcast_reaches_every_member_including_sender() {
        let registry = RoomRegistry::default();
        let (a, mut rx_a) = connect(&registry).await;
        let (b, mut rx_b) = connect(&registry).await;
        let (_c, mut rx_c) = connect(&registry).await;

        registry.join(a, "room-1").await;
        registry.join(b, "room-1").await;

        let sent = registry.broadcast_to_room("room-1", probe_event()).await;
        assert_eq!(sent, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_all_except_skips_the_origin() {
        let registry = RoomRegistry::default();
        let (a, mut rx_a) = connect(&registry).await;
        let (_b, mut rx_b) = connect(&registry).await;

        let sent = registry.broadcast_to_all_except(a, probe_event()).await;
        assert_eq!(sent, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn remove_connection_clears_all_memberships() {
        let registry = RoomRegistry::default();
        let (a, mut rx_a) = connect(&registry).await;
        let (b, _rx_b) = connect(&registry).await;

        registry.join(a, "room-1").await;
        registry.join(a, "room-2").await;
        registry.join(b, "room-1").await;

        registry.remove_connection(a).await;

        assert_eq!(registry.members("room-1").await, vec![b]);
        assert!(!registry.room_exists("room-2").await);
        assert!(registry.rooms_of(a).await.is_empty());

        // No subsequent broadcast targets the gone connection.
        let sent = registry.broadcast_to_all(probe_event()).await;
        assert_eq!(sent, 1);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_targets_exactly_one_connection() {
        let registry = RoomRegistry::default();
        let (a, mut rx_a) = connect(&registry).await;
        let (_b, mut rx_b) = connect(&registry).await;

        assert!(registry.send_to(a, probe_event()).await);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert!(!registry.send_to(Uuid::new_v4(), probe_event()).await);
    }

    #[tokio::test]
    async fn join_leave_parity_across_interleavings() {
        let registry = RoomRegistry::default();
        let (conn, _rx) = connect(&registry).await;

        // join, join, leave → member; leave → gone.
        registry.join(conn, "room-1").await;
        registry.join(conn, "room-1").await;
        registry.leave(conn, "room-1").await;
        assert!(registry.members("room-1").await.is_empty());

        registry.join(conn, "room-1").await;
        assert_eq!(registry.members("room-1").await, vec![conn]);
    }
}
