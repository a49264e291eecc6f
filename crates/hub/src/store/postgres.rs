// PostgreSQL document store backend.
//
// Every operation is a single-statement read or update; the hub never
// opens cross-document transactions. Reaction lists live in a JSONB
// column and are replaced wholesale, matching the read-modify-write
// semantics the reaction state machine documents.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use huddle_common::types::{
    Channel, Conversation, Message, MessageTarget, Reaction, ThreadReply, UserProfile,
};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{NewMessage, NewThreadReply};

const MESSAGE_COLUMNS: &str = "id, organisation, sender, content, channel, conversation, \
     collaborators, is_self, has_read, reactions, thread_replies, thread_replies_count, \
     thread_last_reply_date, created_at";

const THREAD_REPLY_COLUMNS: &str = "id, message, sender, content, has_read, reactions, created_at";

const CHANNEL_COLUMNS: &str =
    "id, name, organisation, collaborators, has_not_open, created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, name, organisation, collaborators, is_self, is_online, \
     has_not_open, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    organisation: Uuid,
    sender: Option<Uuid>,
    content: String,
    channel: Option<Uuid>,
    conversation: Option<Uuid>,
    collaborators: Vec<Uuid>,
    is_self: bool,
    has_read: bool,
    reactions: Json<Vec<Reaction>>,
    thread_replies: Vec<Uuid>,
    thread_replies_count: i64,
    thread_last_reply_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            organisation: row.organisation,
            sender: row.sender,
            content: row.content,
            channel: row.channel,
            conversation: row.conversation,
            collaborators: row.collaborators,
            is_self: row.is_self,
            has_read: row.has_read,
            reactions: row.reactions.0,
            thread_replies: row.thread_replies,
            thread_replies_count: row.thread_replies_count,
            thread_last_reply_date: row.thread_last_reply_date,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ThreadReplyRow {
    id: Uuid,
    message: Uuid,
    sender: Uuid,
    content: String,
    has_read: bool,
    reactions: Json<Vec<Reaction>>,
    created_at: DateTime<Utc>,
}

impl From<ThreadReplyRow> for ThreadReply {
    fn from(row: ThreadReplyRow) -> Self {
        Self {
            id: row.id,
            message: row.message,
            sender: row.sender,
            content: row.content,
            has_read: row.has_read,
            reactions: row.reactions.0,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: Uuid,
    name: String,
    organisation: Uuid,
    collaborators: Vec<Uuid>,
    has_not_open: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            organisation: row.organisation,
            collaborators: row.collaborators,
            has_not_open: row.has_not_open,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    name: Option<String>,
    organisation: Uuid,
    collaborators: Vec<Uuid>,
    is_self: bool,
    is_online: bool,
    has_not_open: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            organisation: row.organisation,
            collaborators: row.collaborators,
            is_self: row.is_self,
            is_online: row.is_online,
            has_not_open: row.has_not_open,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: Option<String>,
    email: Option<String>,
    profile_picture: Option<String>,
    is_online: bool,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            profile_picture: row.profile_picture,
            is_online: row.is_online,
        }
    }
}

pub(crate) async fn create_message(
    pool: &PgPool,
    new: NewMessage,
    created_at: DateTime<Utc>,
) -> Result<Message> {
    let (channel, conversation) = match new.target {
        MessageTarget::Channel(id) => (Some(id), None),
        MessageTarget::Conversation(id) => (None, Some(id)),
    };
    let sql = format!(
        "INSERT INTO messages \
             (id, organisation, sender, content, channel, conversation, collaborators, is_self, \
              has_read, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9) \
         RETURNING {MESSAGE_COLUMNS}"
    );
    let row: MessageRow = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(new.organisation)
        .bind(new.sender)
        .bind(&new.content)
        .bind(channel)
        .bind(conversation)
        .bind(&new.collaborators)
        .bind(new.is_self)
        .bind(created_at)
        .fetch_one(pool)
        .await
        .context("failed to insert message")?;
    Ok(row.into())
}

pub(crate) async fn find_message(pool: &PgPool, id: Uuid) -> Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
    let row: Option<MessageRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load message")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn set_message_reactions(
    pool: &PgPool,
    id: Uuid,
    reactions: &[Reaction],
) -> Result<Option<Message>> {
    let sql = format!(
        "UPDATE messages SET reactions = $2 WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
    );
    let row: Option<MessageRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(Json(reactions.to_vec()))
        .fetch_optional(pool)
        .await
        .context("failed to update message reactions")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn mark_message_read(pool: &PgPool, id: Uuid) -> Result<Option<Message>> {
    let sql =
        format!("UPDATE messages SET has_read = TRUE WHERE id = $1 RETURNING {MESSAGE_COLUMNS}");
    let row: Option<MessageRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to mark message read")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn record_thread_reply(
    pool: &PgPool,
    message_id: Uuid,
    replier: Uuid,
    replied_at: DateTime<Utc>,
) -> Result<Option<Message>> {
    let sql = format!(
        "UPDATE messages SET \
             thread_replies = CASE WHEN $2 = ANY(thread_replies) THEN thread_replies \
                                   ELSE array_append(thread_replies, $2) END, \
             thread_replies_count = thread_replies_count + 1, \
             thread_last_reply_date = $3 \
         WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
    );
    let row: Option<MessageRow> = sqlx::query_as(&sql)
        .bind(message_id)
        .bind(replier)
        .bind(replied_at)
        .fetch_optional(pool)
        .await
        .context("failed to record thread reply on parent message")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn has_message_today(
    pool: &PgPool,
    target: MessageTarget,
    now: DateTime<Utc>,
) -> Result<bool> {
    let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let day_end = day_start + chrono::Duration::days(1);
    let sql = match target {
        MessageTarget::Channel(_) => {
            "SELECT EXISTS(SELECT 1 FROM messages \
             WHERE channel = $1 AND created_at >= $2 AND created_at < $3)"
        }
        MessageTarget::Conversation(_) => {
            "SELECT EXISTS(SELECT 1 FROM messages \
             WHERE conversation = $1 AND created_at >= $2 AND created_at < $3)"
        }
    };
    sqlx::query_scalar::<_, bool>(sql)
        .bind(target.id())
        .bind(day_start)
        .bind(day_end)
        .fetch_one(pool)
        .await
        .context("failed to check for today's first message")
}

pub(crate) async fn create_thread_reply(
    pool: &PgPool,
    new: NewThreadReply,
    created_at: DateTime<Utc>,
) -> Result<ThreadReply> {
    let sql = format!(
        "INSERT INTO thread_replies (id, message, sender, content, has_read, created_at) \
         VALUES ($1, $2, $3, $4, FALSE, $5) RETURNING {THREAD_REPLY_COLUMNS}"
    );
    let row: ThreadReplyRow = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(new.message)
        .bind(new.sender)
        .bind(&new.content)
        .bind(created_at)
        .fetch_one(pool)
        .await
        .context("failed to insert thread reply")?;
    Ok(row.into())
}

pub(crate) async fn find_thread_reply(pool: &PgPool, id: Uuid) -> Result<Option<ThreadReply>> {
    let sql = format!("SELECT {THREAD_REPLY_COLUMNS} FROM thread_replies WHERE id = $1");
    let row: Option<ThreadReplyRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load thread reply")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn set_thread_reply_reactions(
    pool: &PgPool,
    id: Uuid,
    reactions: &[Reaction],
) -> Result<Option<ThreadReply>> {
    let sql = format!(
        "UPDATE thread_replies SET reactions = $2 WHERE id = $1 RETURNING {THREAD_REPLY_COLUMNS}"
    );
    let row: Option<ThreadReplyRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(Json(reactions.to_vec()))
        .fetch_optional(pool)
        .await
        .context("failed to update thread reply reactions")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn find_channel(pool: &PgPool, id: Uuid) -> Result<Option<Channel>> {
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1");
    let row: Option<ChannelRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load channel")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn set_channel_has_not_open(
    pool: &PgPool,
    id: Uuid,
    users: &[Uuid],
) -> Result<Option<Channel>> {
    let sql = format!(
        "UPDATE channels SET has_not_open = $2, updated_at = now() \
         WHERE id = $1 RETURNING {CHANNEL_COLUMNS}"
    );
    let row: Option<ChannelRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(users.to_vec())
        .fetch_optional(pool)
        .await
        .context("failed to set channel unread set")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn pull_channel_has_not_open(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Channel>> {
    let sql = format!(
        "UPDATE channels SET has_not_open = array_remove(has_not_open, $2), updated_at = now() \
         WHERE id = $1 RETURNING {CHANNEL_COLUMNS}"
    );
    let row: Option<ChannelRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to clear user from channel unread set")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn find_conversation(pool: &PgPool, id: Uuid) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
    let row: Option<ConversationRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load conversation")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn set_conversation_has_not_open(
    pool: &PgPool,
    id: Uuid,
    users: &[Uuid],
) -> Result<Option<Conversation>> {
    let sql = format!(
        "UPDATE conversations SET has_not_open = $2, updated_at = now() \
         WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}"
    );
    let row: Option<ConversationRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(users.to_vec())
        .fetch_optional(pool)
        .await
        .context("failed to set conversation unread set")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn pull_conversation_has_not_open(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Conversation>> {
    let sql = format!(
        "UPDATE conversations \
         SET has_not_open = array_remove(has_not_open, $2), updated_at = now() \
         WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}"
    );
    let row: Option<ConversationRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to clear user from conversation unread set")?;
    Ok(row.map(Into::into))
}

pub(crate) async fn update_presence_status(
    pool: &PgPool,
    user_id: Uuid,
    is_online: bool,
) -> Result<()> {
    sqlx::query("UPDATE users SET is_online = $2 WHERE id = $1")
        .bind(user_id)
        .bind(is_online)
        .execute(pool)
        .await
        .context("failed to update user online flag")?;

    sqlx::query(
        "UPDATE conversations SET is_online = $2 \
         WHERE $1 = ANY(collaborators) AND is_self = FALSE",
    )
    .bind(user_id)
    .bind(is_online)
    .execute(pool)
    .await
    .context("failed to update conversation counterpart flag")?;

    Ok(())
}

pub(crate) async fn find_user(pool: &PgPool, id: Uuid) -> Result<Option<UserProfile>> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT id, username, email, profile_picture, is_online FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to load user profile")?;
    Ok(row.map(Into::into))
}
