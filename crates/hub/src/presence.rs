// Presence registry: which users are online, and through which
// connections.
//
// A user is online while at least one of their connections is
// registered. Mutation is serialized behind the registry's lock; the
// socket loop is the only caller. The persisted "counterpart online"
// conversation flag is written best-effort by the event handlers, not
// here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::rooms::ConnectionId;

#[derive(Debug, Default)]
struct PresenceState {
    users: HashMap<Uuid, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    state: Arc<RwLock<PresenceState>>,
}

impl PresenceRegistry {
    /// Record a connection under a user and mark them online. Returns
    /// `true` when the user just came online (first connection) — the
    /// caller then broadcasts the online transition. Idempotent:
    /// re-joining the same (user, connection) pair changes nothing. A
    /// connection can only ever belong to one user; a re-identify
    /// moves it.
    pub async fn join(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut guard = self.state.write().await;
        if let Some(previous) = guard.by_connection.insert(connection_id, user_id) {
            if previous != user_id {
                if let Some(connections) = guard.users.get_mut(&previous) {
                    connections.remove(&connection_id);
                    if connections.is_empty() {
                        guard.users.remove(&previous);
                    }
                }
            }
        }
        let came_online = !guard.users.contains_key(&user_id);
        guard.users.entry(user_id).or_default().insert(connection_id);
        came_online
    }

    /// Remove a connection from a user. Returns `true` when this was
    /// the user's last connection — the caller then broadcasts the
    /// offline transition.
    pub async fn leave(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut guard = self.state.write().await;
        if guard.by_connection.get(&connection_id) == Some(&user_id) {
            guard.by_connection.remove(&connection_id);
        }
        let Some(connections) = guard.users.get_mut(&user_id) else {
            return false;
        };
        connections.remove(&connection_id);
        if connections.is_empty() {
            guard.users.remove(&user_id);
            true
        } else {
            false
        }
    }

    /// Disconnect cleanup. Returns the user the connection belonged to
    /// and whether they went offline with it.
    pub async fn remove_connection(&self, connection_id: ConnectionId) -> Option<(Uuid, bool)> {
        let user_id = self.state.read().await.by_connection.get(&connection_id).copied()?;
        let went_offline = self.leave(user_id, connection_id).await;
        Some((user_id, went_offline))
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.state.read().await.users.contains_key(&user_id)
    }

    pub async fn connections_for(&self, user_id: Uuid) -> Vec<ConnectionId> {
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .map(|connections| connections.iter().copied().collect())
            .unwrap_or_default()
    }
}
