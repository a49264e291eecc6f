// WebSocket event types for the huddle hub protocol.
//
// Events are JSON objects tagged by a kebab-case `type` field with
// camelCase payload fields, matching what the web client sends. The
// same event names appear in both directions where the hub mirrors an
// inbound event back out (`user-join`, `message`, `join-room`, ...).

use crate::types::{
    Channel, Conversation, PopulatedMessage, PopulatedThreadReply, UserProfile,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The sender/content pair of a not-yet-persisted message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub sender: Uuid,
    pub content: String,
}

/// Client → server events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// A user came online (sent once per tab after connecting).
    UserJoin { id: Uuid, is_online: bool },

    /// A user went offline.
    UserLeave { id: Uuid, is_online: bool },

    /// The client is now viewing a channel.
    ChannelOpen {
        #[serde(default)]
        id: Option<Uuid>,
        user_id: Uuid,
    },

    /// The client is now viewing a conversation.
    ConvoOpen {
        #[serde(default)]
        id: Option<Uuid>,
        user_id: Uuid,
    },

    /// A new message for a channel XOR a conversation.
    Message {
        #[serde(default)]
        channel_id: Option<Uuid>,
        #[serde(default)]
        channel_name: Option<String>,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        collaborators: Vec<Uuid>,
        #[serde(default)]
        is_self: bool,
        message: MessageDraft,
        organisation: Uuid,
        /// The audience that should now see an unread badge. Supplied by
        /// the caller; the hub does not recompute it.
        #[serde(default)]
        has_not_open: Vec<Uuid>,
    },

    /// A reply inside a message's thread.
    ThreadMessage {
        user_id: Uuid,
        message_id: Uuid,
        message: MessageDraft,
    },

    /// The client viewed a message.
    MessageView { message_id: Uuid },

    /// Toggle a reaction on a message (`is_thread: false`) or a thread
    /// reply (`is_thread: true`).
    Reaction {
        emoji: String,
        id: Uuid,
        #[serde(default)]
        is_thread: bool,
        user_id: Uuid,
    },

    /// Join a meeting room for WebRTC signaling.
    JoinRoom { room_id: String, user_id: Uuid },

    /// SDP offer for the target peer.
    Offer {
        offer: serde_json::Value,
        target_user_id: Uuid,
    },

    /// SDP answer from the named sender.
    Answer {
        answer: serde_json::Value,
        sender_user_id: Uuid,
    },

    /// ICE candidate for the target peer.
    IceCandidate {
        candidate: serde_json::Value,
        target_user_id: Uuid,
    },

    /// Leave a meeting room.
    RoomLeave { room_id: String, user_id: Uuid },
}

/// The document carried by a `message-updated` event: a populated
/// message for top-level targets, a populated reply for thread targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UpdatedDocument {
    Message(Box<PopulatedMessage>),
    ThreadReply(Box<PopulatedThreadReply>),
}

/// Server → client events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Presence change, broadcast to every connection.
    UserJoin { id: Uuid, is_online: bool },

    /// Presence change, broadcast to every connection.
    UserLeave { id: Uuid, is_online: bool },

    /// A channel document changed (unread set, usually).
    ChannelUpdated { channel: Channel },

    /// A conversation document changed.
    ConvoUpdated { conversation: Conversation },

    /// A new message, delivered to the target room.
    Message {
        new_message: Box<PopulatedMessage>,
        organisation: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collaborators: Option<Vec<Uuid>>,
    },

    /// A new thread reply, delivered to the thread room.
    ThreadMessage { new_message: Box<PopulatedThreadReply> },

    /// A message or thread reply changed (thread counters, reactions).
    MessageUpdated {
        id: Uuid,
        message: UpdatedDocument,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_thread: Option<bool>,
    },

    /// A message was marked read, broadcast to every connection.
    MessageView { message_id: Uuid },

    /// Unread ping for clients not viewing the target room, broadcast to
    /// every connection except the sender's.
    Notification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        collaborators: Vec<Uuid>,
        new_message: Box<PopulatedMessage>,
        organisation: Uuid,
    },

    /// Another peer joined the meeting room.
    JoinRoom { room_id: String, other_user_id: Uuid },

    /// SDP offer relayed to the target peer.
    Offer {
        offer: serde_json::Value,
        sender_user_id: Uuid,
    },

    /// SDP answer relayed broadly.
    Answer {
        answer: serde_json::Value,
        sender_user_id: Uuid,
    },

    /// ICE candidate relayed to the target peer.
    IceCandidate {
        candidate: serde_json::Value,
        sender_user_id: Uuid,
    },

    /// A peer left the meeting room.
    RoomLeave { room_id: String, left_user_id: Uuid },

    /// Server → client error.
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_event_tags_are_kebab_case() {
        let event = ClientEvent::UserJoin { id: Uuid::nil(), is_online: true };
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(value["type"], "user-join");
        assert_eq!(value["isOnline"], true);
    }

    #[test]
    fn message_event_parses_channel_payload() {
        let sender = Uuid::new_v4();
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "message",
            "channelId": Uuid::new_v4(),
            "channelName": "general",
            "collaborators": [],
            "message": { "sender": sender, "content": "hi" },
            "organisation": Uuid::new_v4(),
            "hasNotOpen": [Uuid::new_v4()],
        }))
        .expect("channel message should parse");

        match event {
            ClientEvent::Message { channel_id, conversation_id, message, .. } => {
                assert!(channel_id.is_some());
                assert!(conversation_id.is_none());
                assert_eq!(message.sender, sender);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_open_tolerates_missing_id() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "channel-open",
            "userId": Uuid::new_v4(),
        }))
        .expect("channel-open without id should parse");
        assert!(matches!(event, ClientEvent::ChannelOpen { id: None, .. }));
    }

    #[test]
    fn signaling_payloads_pass_through_opaque_json() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "offer",
            "offer": { "sdp": "v=0...", "type": "offer" },
            "targetUserId": Uuid::new_v4(),
        }))
        .expect("offer should parse");
        match event {
            ClientEvent::Offer { offer, .. } => assert_eq!(offer["type"], "offer"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn server_error_event_shape() {
        let event = ServerEvent::Error {
            code: "HUB_INVALID_EVENT".into(),
            message: "bad frame".into(),
            retryable: false,
        };
        let value = serde_json::to_value(&event).expect("error should serialize");
        assert_eq!(value["type"], "error");
        assert_eq!(value["retryable"], false);
    }

    #[test]
    fn notification_omits_absent_target_fields() {
        let message = PopulatedMessage {
            id: Uuid::nil(),
            organisation: Uuid::nil(),
            sender: None,
            content: "hi".into(),
            channel: None,
            conversation: Some(Uuid::nil()),
            collaborators: vec![],
            is_self: false,
            has_read: false,
            reactions: vec![],
            thread_replies: vec![],
            thread_replies_count: 0,
            thread_last_reply_date: None,
            created_at: chrono::Utc::now(),
        };
        let event = ServerEvent::Notification {
            channel_name: None,
            channel_id: None,
            conversation_id: Some(Uuid::nil()),
            collaborators: vec![],
            new_message: Box::new(message),
            organisation: Uuid::nil(),
        };
        let value = serde_json::to_value(&event).expect("notification should serialize");
        assert!(value.get("channelId").is_none());
        assert!(value.get("conversationId").is_some());
    }
}
