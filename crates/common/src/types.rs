// Persisted document types shared between the hub and its tests.
//
// Storage stays normalized: documents reference users by id. The
// `Populated*` variants carry denormalized sender/reactor profiles and
// exist only for the wire — the hub builds them right before broadcast
// and never writes them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public profile fields of a user, as embedded in wire payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

/// One emoji bucket on a message or thread reply.
///
/// Invariants: `emoji` is unique within a document's reaction list and
/// `reacted_to_by` never holds duplicate user ids. An empty bucket is
/// removed rather than kept around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub reacted_to_by: Vec<Uuid>,
}

/// A reaction bucket with reactor profiles populated for the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedReaction {
    pub emoji: String,
    pub reacted_to_by: Vec<UserProfile>,
}

/// A persisted chat message. Parent is a channel XOR a conversation.
///
/// `sender` is `None` only for synthetic day-marker messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub organisation: Uuid,
    pub sender: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub channel: Option<Uuid>,
    #[serde(default)]
    pub conversation: Option<Uuid>,
    #[serde(default)]
    pub collaborators: Vec<Uuid>,
    #[serde(default)]
    pub is_self: bool,
    pub has_read: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// User ids that have replied in this message's thread.
    #[serde(default)]
    pub thread_replies: Vec<Uuid>,
    #[serde(default)]
    pub thread_replies_count: i64,
    #[serde(default)]
    pub thread_last_reply_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A persisted reply inside a message's thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadReply {
    pub id: Uuid,
    /// Parent message id.
    pub message: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub has_read: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
}

/// A named channel within an organisation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub organisation: Uuid,
    #[serde(default)]
    pub collaborators: Vec<Uuid>,
    /// Users who have not yet opened the channel since its last activity.
    #[serde(default)]
    pub has_not_open: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A direct conversation between two users (or one user and themself).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub organisation: Uuid,
    #[serde(default)]
    pub collaborators: Vec<Uuid>,
    #[serde(default)]
    pub is_self: bool,
    /// Whether the counterpart is currently online. Best-effort, written
    /// by the presence registry.
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub has_not_open: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message with sender, reactor, and thread-replier profiles attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedMessage {
    pub id: Uuid,
    pub organisation: Uuid,
    pub sender: Option<UserProfile>,
    pub content: String,
    #[serde(default)]
    pub channel: Option<Uuid>,
    #[serde(default)]
    pub conversation: Option<Uuid>,
    #[serde(default)]
    pub collaborators: Vec<Uuid>,
    #[serde(default)]
    pub is_self: bool,
    pub has_read: bool,
    #[serde(default)]
    pub reactions: Vec<PopulatedReaction>,
    #[serde(default)]
    pub thread_replies: Vec<UserProfile>,
    #[serde(default)]
    pub thread_replies_count: i64,
    #[serde(default)]
    pub thread_last_reply_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A thread reply with sender and reactor profiles attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedThreadReply {
    pub id: Uuid,
    pub message: Uuid,
    pub sender: Option<UserProfile>,
    pub content: String,
    pub has_read: bool,
    #[serde(default)]
    pub reactions: Vec<PopulatedReaction>,
    pub created_at: DateTime<Utc>,
}

/// The parent a message belongs to: a channel XOR a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    Channel(Uuid),
    Conversation(Uuid),
}

impl MessageTarget {
    pub fn id(self) -> Uuid {
        match self {
            Self::Channel(id) | Self::Conversation(id) => id,
        }
    }
}
