// In-memory document store backing development mode and unit tests.
//
// Mirrors the Postgres backend's single-document semantics: every
// operation reads or writes exactly one entry under the write lock, so
// interleavings observable here match what concurrent hub tasks see
// against the real database.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use huddle_common::types::{
    Channel, Conversation, Message, MessageTarget, Reaction, ThreadReply, UserProfile,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewMessage, NewThreadReply};

#[derive(Debug, Default)]
struct MemoryDb {
    users: HashMap<Uuid, UserProfile>,
    channels: HashMap<Uuid, Channel>,
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Message>,
    thread_replies: HashMap<Uuid, ThreadReply>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    db: Arc<RwLock<MemoryDb>>,
}

impl MemoryStore {
    pub(crate) async fn create_message(
        &self,
        new: NewMessage,
        created_at: DateTime<Utc>,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            organisation: new.organisation,
            sender: new.sender,
            content: new.content,
            channel: match new.target {
                MessageTarget::Channel(id) => Some(id),
                MessageTarget::Conversation(_) => None,
            },
            conversation: match new.target {
                MessageTarget::Conversation(id) => Some(id),
                MessageTarget::Channel(_) => None,
            },
            collaborators: new.collaborators,
            is_self: new.is_self,
            has_read: false,
            reactions: Vec::new(),
            thread_replies: Vec::new(),
            thread_replies_count: 0,
            thread_last_reply_date: None,
            created_at,
        };
        self.db.write().await.messages.insert(message.id, message.clone());
        message
    }

    pub(crate) async fn find_message(&self, id: Uuid) -> Option<Message> {
        self.db.read().await.messages.get(&id).cloned()
    }

    pub(crate) async fn set_message_reactions(
        &self,
        id: Uuid,
        reactions: &[Reaction],
    ) -> Option<Message> {
        let mut guard = self.db.write().await;
        let message = guard.messages.get_mut(&id)?;
        message.reactions = reactions.to_vec();
        Some(message.clone())
    }

    pub(crate) async fn mark_message_read(&self, id: Uuid) -> Option<Message> {
        let mut guard = self.db.write().await;
        let message = guard.messages.get_mut(&id)?;
        message.has_read = true;
        Some(message.clone())
    }

    pub(crate) async fn record_thread_reply(
        &self,
        message_id: Uuid,
        replier: Uuid,
        replied_at: DateTime<Utc>,
    ) -> Option<Message> {
        let mut guard = self.db.write().await;
        let message = guard.messages.get_mut(&message_id)?;
        if !message.thread_replies.contains(&replier) {
            message.thread_replies.push(replier);
        }
        message.thread_replies_count += 1;
        message.thread_last_reply_date = Some(replied_at);
        Some(message.clone())
    }

    pub(crate) async fn has_message_today(
        &self,
        target: MessageTarget,
        now: DateTime<Utc>,
    ) -> bool {
        let today = now.date_naive();
        self.db.read().await.messages.values().any(|message| {
            let matches_target = match target {
                MessageTarget::Channel(id) => message.channel == Some(id),
                MessageTarget::Conversation(id) => message.conversation == Some(id),
            };
            matches_target && message.created_at.date_naive() == today
        })
    }

    pub(crate) async fn create_thread_reply(
        &self,
        new: NewThreadReply,
        created_at: DateTime<Utc>,
    ) -> ThreadReply {
        let reply = ThreadReply {
            id: Uuid::new_v4(),
            message: new.message,
            sender: new.sender,
            content: new.content,
            has_read: false,
            reactions: Vec::new(),
            created_at,
        };
        self.db.write().await.thread_replies.insert(reply.id, reply.clone());
        reply
    }

    pub(crate) async fn find_thread_reply(&self, id: Uuid) -> Option<ThreadReply> {
        self.db.read().await.thread_replies.get(&id).cloned()
    }

    pub(crate) async fn set_thread_reply_reactions(
        &self,
        id: Uuid,
        reactions: &[Reaction],
    ) -> Option<ThreadReply> {
        let mut guard = self.db.write().await;
        let reply = guard.thread_replies.get_mut(&id)?;
        reply.reactions = reactions.to_vec();
        Some(reply.clone())
    }

    pub(crate) async fn find_channel(&self, id: Uuid) -> Option<Channel> {
        self.db.read().await.channels.get(&id).cloned()
    }

    pub(crate) async fn set_channel_has_not_open(
        &self,
        id: Uuid,
        users: &[Uuid],
    ) -> Option<Channel> {
        let mut guard = self.db.write().await;
        let channel = guard.channels.get_mut(&id)?;
        channel.has_not_open = users.to_vec();
        channel.updated_at = Utc::now();
        Some(channel.clone())
    }

    pub(crate) async fn pull_channel_has_not_open(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Option<Channel> {
        let mut guard = self.db.write().await;
        let channel = guard.channels.get_mut(&id)?;
        channel.has_not_open.retain(|u| *u != user_id);
        channel.updated_at = Utc::now();
        Some(channel.clone())
    }

    pub(crate) async fn find_conversation(&self, id: Uuid) -> Option<Conversation> {
        self.db.read().await.conversations.get(&id).cloned()
    }

    pub(crate) async fn set_conversation_has_not_open(
        &self,
        id: Uuid,
        users: &[Uuid],
    ) -> Option<Conversation> {
        let mut guard = self.db.write().await;
        let conversation = guard.conversations.get_mut(&id)?;
        conversation.has_not_open = users.to_vec();
        conversation.updated_at = Utc::now();
        Some(conversation.clone())
    }

    pub(crate) async fn pull_conversation_has_not_open(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Option<Conversation> {
        let mut guard = self.db.write().await;
        let conversation = guard.conversations.get_mut(&id)?;
        conversation.has_not_open.retain(|u| *u != user_id);
        conversation.updated_at = Utc::now();
        Some(conversation.clone())
    }

    pub(crate) async fn update_presence_status(&self, user_id: Uuid, is_online: bool) {
        let mut guard = self.db.write().await;
        if let Some(user) = guard.users.get_mut(&user_id) {
            user.is_online = is_online;
        }
        for conversation in guard.conversations.values_mut() {
            if !conversation.is_self && conversation.collaborators.contains(&user_id) {
                conversation.is_online = is_online;
            }
        }
    }

    pub(crate) async fn find_user(&self, id: Uuid) -> Option<UserProfile> {
        self.db.read().await.users.get(&id).cloned()
    }

    pub(crate) async fn insert_user(&self, user: UserProfile) {
        self.db.write().await.users.insert(user.id, user);
    }

    pub(crate) async fn insert_channel(&self, channel: Channel) {
        self.db.write().await.channels.insert(channel.id, channel);
    }

    pub(crate) async fn insert_conversation(&self, conversation: Conversation) {
        self.db.write().await.conversations.insert(conversation.id, conversation);
    }

    #[cfg(test)]
    pub(crate) async fn messages_for_target(&self, target: MessageTarget) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .db
            .read()
            .await
            .messages
            .values()
            .filter(|message| match target {
                MessageTarget::Channel(id) => message.channel == Some(id),
                MessageTarget::Conversation(id) => message.conversation == Some(id),
            })
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.created_at);
        messages
    }
}
