pub mod handler;

use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::signaling::SignalingRegistry;
use crate::store::DocumentStore;

pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
pub const MAX_FRAME_BYTES: u32 = 262_144;

/// Shared hub state handed to every connection task.
#[derive(Clone)]
pub struct HubState {
    pub store: DocumentStore,
    pub rooms: RoomRegistry,
    pub presence: PresenceRegistry,
    pub signaling: SignalingRegistry,
}

impl HubState {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            rooms: RoomRegistry::default(),
            presence: PresenceRegistry::default(),
            signaling: SignalingRegistry::default(),
        }
    }
}
