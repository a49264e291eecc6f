// Document store collaborator.
//
// The hub only ever performs single-document operations (find, create,
// partial update) against the persistence layer; it does not own the
// documents and must tolerate concurrent writes from the CRUD API.
// Backends: PostgreSQL for production, an in-memory map store for
// development and tests.

mod memory;
mod postgres;

use anyhow::Result;
use chrono::{DateTime, Utc};
use huddle_common::types::{
    Channel, Conversation, Message, MessageTarget, Reaction, ThreadReply, UserProfile,
};
use sqlx::PgPool;
use uuid::Uuid;

pub use memory::MemoryStore;

/// Input for a message insert. `target` decides the parent column.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub organisation: Uuid,
    /// `None` only for synthetic day-marker messages.
    pub sender: Option<Uuid>,
    pub content: String,
    pub target: MessageTarget,
    pub collaborators: Vec<Uuid>,
    pub is_self: bool,
}

/// Input for a thread reply insert.
#[derive(Debug, Clone)]
pub struct NewThreadReply {
    pub message: Uuid,
    pub sender: Uuid,
    pub content: String,
}

#[derive(Clone)]
pub enum DocumentStore {
    Postgres(PgPool),
    Memory(MemoryStore),
}

impl DocumentStore {
    pub fn postgres(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    pub fn in_memory() -> Self {
        Self::Memory(MemoryStore::default())
    }

    pub async fn create_message(
        &self,
        new: NewMessage,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        match self {
            Self::Postgres(pool) => postgres::create_message(pool, new, created_at).await,
            Self::Memory(store) => Ok(store.create_message(new, created_at).await),
        }
    }

    pub async fn find_message(&self, id: Uuid) -> Result<Option<Message>> {
        match self {
            Self::Postgres(pool) => postgres::find_message(pool, id).await,
            Self::Memory(store) => Ok(store.find_message(id).await),
        }
    }

    pub async fn set_message_reactions(
        &self,
        id: Uuid,
        reactions: &[Reaction],
    ) -> Result<Option<Message>> {
        match self {
            Self::Postgres(pool) => postgres::set_message_reactions(pool, id, reactions).await,
            Self::Memory(store) => Ok(store.set_message_reactions(id, reactions).await),
        }
    }

    pub async fn mark_message_read(&self, id: Uuid) -> Result<Option<Message>> {
        match self {
            Self::Postgres(pool) => postgres::mark_message_read(pool, id).await,
            Self::Memory(store) => Ok(store.mark_message_read(id).await),
        }
    }

    /// Apply a thread reply to its parent: add-to-set the replier,
    /// bump the reply count, stamp the last-reply date.
    pub async fn record_thread_reply(
        &self,
        message_id: Uuid,
        replier: Uuid,
        replied_at: DateTime<Utc>,
    ) -> Result<Option<Message>> {
        match self {
            Self::Postgres(pool) => {
                postgres::record_thread_reply(pool, message_id, replier, replied_at).await
            }
            Self::Memory(store) => {
                Ok(store.record_thread_reply(message_id, replier, replied_at).await)
            }
        }
    }

    /// Whether any message exists for the target within the UTC
    /// calendar day containing `now`.
    pub async fn has_message_today(
        &self,
        target: MessageTarget,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::has_message_today(pool, target, now).await,
            Self::Memory(store) => Ok(store.has_message_today(target, now).await),
        }
    }

    pub async fn create_thread_reply(
        &self,
        new: NewThreadReply,
        created_at: DateTime<Utc>,
    ) -> Result<ThreadReply> {
        match self {
            Self::Postgres(pool) => postgres::create_thread_reply(pool, new, created_at).await,
            Self::Memory(store) => Ok(store.create_thread_reply(new, created_at).await),
        }
    }

    pub async fn find_thread_reply(&self, id: Uuid) -> Result<Option<ThreadReply>> {
        match self {
            Self::Postgres(pool) => postgres::find_thread_reply(pool, id).await,
            Self::Memory(store) => Ok(store.find_thread_reply(id).await),
        }
    }

    pub async fn set_thread_reply_reactions(
        &self,
        id: Uuid,
        reactions: &[Reaction],
    ) -> Result<Option<ThreadReply>> {
        match self {
            Self::Postgres(pool) => {
                postgres::set_thread_reply_reactions(pool, id, reactions).await
            }
            Self::Memory(store) => Ok(store.set_thread_reply_reactions(id, reactions).await),
        }
    }

    pub async fn find_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        match self {
            Self::Postgres(pool) => postgres::find_channel(pool, id).await,
            Self::Memory(store) => Ok(store.find_channel(id).await),
        }
    }

    /// Overwrite the channel's unread set with the caller-supplied
    /// audience.
    pub async fn set_channel_has_not_open(
        &self,
        id: Uuid,
        users: &[Uuid],
    ) -> Result<Option<Channel>> {
        match self {
            Self::Postgres(pool) => postgres::set_channel_has_not_open(pool, id, users).await,
            Self::Memory(store) => Ok(store.set_channel_has_not_open(id, users).await),
        }
    }

    /// Remove one user from the channel's unread set (room open).
    pub async fn pull_channel_has_not_open(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Channel>> {
        match self {
            Self::Postgres(pool) => postgres::pull_channel_has_not_open(pool, id, user_id).await,
            Self::Memory(store) => Ok(store.pull_channel_has_not_open(id, user_id).await),
        }
    }

    pub async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        match self {
            Self::Postgres(pool) => postgres::find_conversation(pool, id).await,
            Self::Memory(store) => Ok(store.find_conversation(id).await),
        }
    }

    pub async fn set_conversation_has_not_open(
        &self,
        id: Uuid,
        users: &[Uuid],
    ) -> Result<Option<Conversation>> {
        match self {
            Self::Postgres(pool) => {
                postgres::set_conversation_has_not_open(pool, id, users).await
            }
            Self::Memory(store) => Ok(store.set_conversation_has_not_open(id, users).await),
        }
    }

    pub async fn pull_conversation_has_not_open(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>> {
        match self {
            Self::Postgres(pool) => {
                postgres::pull_conversation_has_not_open(pool, id, user_id).await
            }
            Self::Memory(store) => Ok(store.pull_conversation_has_not_open(id, user_id).await),
        }
    }

    /// Best-effort presence flag write: the user's own `is_online` and
    /// the counterpart flag on every conversation that includes them.
    pub async fn update_presence_status(&self, user_id: Uuid, is_online: bool) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::update_presence_status(pool, user_id, is_online).await,
            Self::Memory(store) => {
                store.update_presence_status(user_id, is_online).await;
                Ok(())
            }
        }
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<UserProfile>> {
        match self {
            Self::Postgres(pool) => postgres::find_user(pool, id).await,
            Self::Memory(store) => Ok(store.find_user(id).await),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::in_memory()
    }

    #[cfg(test)]
    pub(crate) async fn insert_user_for_tests(&self, user: UserProfile) {
        if let Self::Memory(store) = self {
            store.insert_user(user).await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn insert_channel_for_tests(&self, channel: Channel) {
        if let Self::Memory(store) = self {
            store.insert_channel(channel).await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn insert_conversation_for_tests(&self, conversation: Conversation) {
        if let Self::Memory(store) = self {
            store.insert_conversation(conversation).await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn messages_for_target_for_tests(
        &self,
        target: MessageTarget,
    ) -> Vec<Message> {
        match self {
            Self::Memory(store) => store.messages_for_target(target).await,
            Self::Postgres(_) => Vec::new(),
        }
    }
}
