// Message fan-out pipeline and document event handlers.
//
// Each handler is one inbound event: persist, populate identities onto
// the wire copy, broadcast. Handlers return `anyhow::Result`; the
// socket loop logs failures and drops the event, it never tears the
// connection down over a persistence error. Partial writes (message
// persisted, unread update lost) are an accepted consistency gap and
// are corrected by the client's next full fetch.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use huddle_common::protocol::ws::{MessageDraft, ServerEvent, UpdatedDocument};
use huddle_common::types::{
    Message, MessageTarget, PopulatedMessage, PopulatedReaction, PopulatedThreadReply, Reaction,
    ThreadReply, UserProfile,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::reaction::toggle_reaction;
use crate::rooms::{ConnectionId, RoomRegistry};
use crate::store::{DocumentStore, NewMessage, NewThreadReply};

/// Payload of an inbound `message` event.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: Option<Uuid>,
    pub channel_name: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub collaborators: Vec<Uuid>,
    pub is_self: bool,
    pub message: MessageDraft,
    pub organisation: Uuid,
    pub has_not_open: Vec<Uuid>,
}

/// `channel-open`: the user is now viewing the channel. Joins the room
/// and clears their unread flag. A missing id is ignored.
pub async fn handle_channel_open(
    store: &DocumentStore,
    rooms: &RoomRegistry,
    connection_id: ConnectionId,
    id: Option<Uuid>,
    user_id: Uuid,
) -> Result<()> {
    let Some(channel_id) = id else {
        return Ok(());
    };
    rooms.join(connection_id, &channel_id.to_string()).await;
    let updated = store
        .pull_channel_has_not_open(channel_id, user_id)
        .await
        .context("clear channel unread flag")?;
    match updated {
        Some(channel) => {
            rooms
                .broadcast_to_room(&channel_id.to_string(), ServerEvent::ChannelUpdated { channel })
                .await;
        }
        None => debug!(%channel_id, "channel-open for unknown channel"),
    }
    Ok(())
}

/// `convo-open`: conversation counterpart of `channel-open`.
pub async fn handle_convo_open(
    store: &DocumentStore,
    rooms: &RoomRegistry,
    connection_id: ConnectionId,
    id: Option<Uuid>,
    user_id: Uuid,
) -> Result<()> {
    let Some(conversation_id) = id else {
        return Ok(());
    };
    rooms.join(connection_id, &conversation_id.to_string()).await;
    let updated = store
        .pull_conversation_has_not_open(conversation_id, user_id)
        .await
        .context("clear conversation unread flag")?;
    match updated {
        Some(conversation) => {
            rooms
                .broadcast_to_room(
                    &conversation_id.to_string(),
                    ServerEvent::ConvoUpdated { conversation },
                )
                .await;
        }
        None => debug!(%conversation_id, "convo-open for unknown conversation"),
    }
    Ok(())
}

/// `message`: the full fan-out pipeline. Joins the target room, lays
/// down the day marker when this is the first message of the UTC day,
/// persists, broadcasts `message` plus the updated parent entity to
/// the room, and pings everyone else with a `notification`.
pub async fn handle_message(
    store: &DocumentStore,
    rooms: &RoomRegistry,
    connection_id: ConnectionId,
    inbound: InboundMessage,
) -> Result<()> {
    // Channel wins when a confused client supplies both ids.
    let target = match (inbound.channel_id, inbound.conversation_id) {
        (Some(id), _) => MessageTarget::Channel(id),
        (None, Some(id)) => MessageTarget::Conversation(id),
        (None, None) => {
            debug!("message event without channel or conversation id, dropped");
            return Ok(());
        }
    };
    let room_id = target.id().to_string();
    rooms.join(connection_id, &room_id).await;

    let now = Utc::now();
    ensure_day_marker(store, target, inbound.organisation, now).await?;

    let is_conversation = matches!(target, MessageTarget::Conversation(_));
    let stored = store
        .create_message(
            NewMessage {
                organisation: inbound.organisation,
                sender: Some(inbound.message.sender),
                content: inbound.message.content.clone(),
                target,
                collaborators: if is_conversation { inbound.collaborators.clone() } else { vec![] },
                is_self: is_conversation && inbound.is_self,
            },
            now,
        )
        .await
        .context("persist message")?;
    let populated = populate_message(store, &stored).await?;

    rooms
        .broadcast_to_room(
            &room_id,
            ServerEvent::Message {
                new_message: Box::new(populated.clone()),
                organisation: inbound.organisation,
                collaborators: is_conversation.then(|| inbound.collaborators.clone()),
            },
        )
        .await;

    match target {
        MessageTarget::Channel(channel_id) => {
            match store
                .set_channel_has_not_open(channel_id, &inbound.has_not_open)
                .await
                .context("set channel unread audience")?
            {
                Some(channel) => {
                    rooms
                        .broadcast_to_room(&room_id, ServerEvent::ChannelUpdated { channel })
                        .await;
                }
                None => warn!(%channel_id, "message for unknown channel"),
            }
        }
        MessageTarget::Conversation(conversation_id) => {
            match store
                .set_conversation_has_not_open(conversation_id, &inbound.has_not_open)
                .await
                .context("set conversation unread audience")?
            {
                Some(conversation) => {
                    rooms
                        .broadcast_to_room(&room_id, ServerEvent::ConvoUpdated { conversation })
                        .await;
                }
                None => warn!(%conversation_id, "message for unknown conversation"),
            }
        }
    }

    rooms
        .broadcast_to_all_except(
            connection_id,
            ServerEvent::Notification {
                channel_name: inbound.channel_name,
                channel_id: inbound.channel_id,
                conversation_id: if is_conversation { inbound.conversation_id } else { None },
                collaborators: inbound.collaborators,
                new_message: Box::new(populated),
                organisation: inbound.organisation,
            },
        )
        .await;

    Ok(())
}

/// `thread-message`: persist the reply, broadcast it to the thread
/// room, then fold the reply into the parent's thread counters and
/// broadcast the updated parent.
pub async fn handle_thread_message(
    store: &DocumentStore,
    rooms: &RoomRegistry,
    connection_id: ConnectionId,
    user_id: Uuid,
    message_id: Uuid,
    draft: MessageDraft,
) -> Result<()> {
    let room_id = message_id.to_string();
    rooms.join(connection_id, &room_id).await;

    let reply = store
        .create_thread_reply(
            NewThreadReply { message: message_id, sender: draft.sender, content: draft.content },
            Utc::now(),
        )
        .await
        .context("persist thread reply")?;
    let populated_reply = populate_thread_reply(store, &reply).await?;
    rooms
        .broadcast_to_room(
            &room_id,
            ServerEvent::ThreadMessage { new_message: Box::new(populated_reply) },
        )
        .await;

    let updated = store
        .record_thread_reply(message_id, user_id, reply.created_at)
        .await
        .context("update thread counters")?;
    match updated {
        Some(parent) => {
            let populated_parent = populate_message(store, &parent).await?;
            rooms
                .broadcast_to_room(
                    &room_id,
                    ServerEvent::MessageUpdated {
                        id: message_id,
                        message: UpdatedDocument::Message(Box::new(populated_parent)),
                        is_thread: None,
                    },
                )
                .await;
        }
        None => warn!(%message_id, "thread reply for unknown parent message"),
    }
    Ok(())
}

/// `message-view`: mark read, tell every connection.
pub async fn handle_message_view(
    store: &DocumentStore,
    rooms: &RoomRegistry,
    message_id: Uuid,
) -> Result<()> {
    match store.mark_message_read(message_id).await.context("mark message read")? {
        Some(_) => {
            rooms.broadcast_to_all(ServerEvent::MessageView { message_id }).await;
        }
        None => debug!(%message_id, "message-view for unknown message"),
    }
    Ok(())
}

/// `reaction`: toggle the emoji for the user on a message or thread
/// reply, persist the whole reaction list back, and echo the updated
/// document to the acting connection only. Missing targets are
/// dropped.
pub async fn handle_reaction(
    store: &DocumentStore,
    rooms: &RoomRegistry,
    connection_id: ConnectionId,
    emoji: &str,
    id: Uuid,
    is_thread: bool,
    user_id: Uuid,
) -> Result<()> {
    if is_thread {
        let Some(mut reply) = store.find_thread_reply(id).await.context("load thread reply")?
        else {
            debug!(%id, "reaction for unknown thread reply");
            return Ok(());
        };
        toggle_reaction(&mut reply.reactions, emoji, user_id);
        store
            .set_thread_reply_reactions(id, &reply.reactions)
            .await
            .context("persist thread reply reactions")?;
        let populated = populate_thread_reply(store, &reply).await?;
        rooms
            .send_to(
                connection_id,
                ServerEvent::MessageUpdated {
                    id,
                    message: UpdatedDocument::ThreadReply(Box::new(populated)),
                    is_thread: Some(true),
                },
            )
            .await;
    } else {
        let Some(mut message) = store.find_message(id).await.context("load message")? else {
            debug!(%id, "reaction for unknown message");
            return Ok(());
        };
        toggle_reaction(&mut message.reactions, emoji, user_id);
        store
            .set_message_reactions(id, &message.reactions)
            .await
            .context("persist message reactions")?;
        let populated = populate_message(store, &message).await?;
        rooms
            .send_to(
                connection_id,
                ServerEvent::MessageUpdated {
                    id,
                    message: UpdatedDocument::Message(Box::new(populated)),
                    is_thread: Some(false),
                },
            )
            .await;
    }
    Ok(())
}

/// Lay down the synthetic date-separator message when nothing has been
/// posted to the target yet this UTC day. The marker is stamped at the
/// start of the day so it sorts strictly before the message that
/// triggered it. Check-then-create: one duplicate marker may slip
/// through under a true concurrent race.
async fn ensure_day_marker(
    store: &DocumentStore,
    target: MessageTarget,
    organisation: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    if store.has_message_today(target, now).await.context("check for day marker")? {
        return Ok(());
    }
    let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    store
        .create_message(
            NewMessage {
                organisation,
                sender: None,
                content: now.format("%Y-%m-%d").to_string(),
                target,
                collaborators: vec![],
                is_self: false,
            },
            day_start,
        )
        .await
        .context("create day marker")?;
    Ok(())
}

/// Resolve a user id to its public profile, falling back to a bare
/// id-only profile when the user document is gone. Keeps wire counts
/// stable under deleted accounts.
async fn profile(store: &DocumentStore, id: Uuid) -> Result<UserProfile> {
    Ok(store.find_user(id).await.context("load user profile")?.unwrap_or(UserProfile {
        id,
        username: None,
        email: None,
        profile_picture: None,
        is_online: false,
    }))
}

async fn populate_reactions(
    store: &DocumentStore,
    reactions: &[Reaction],
) -> Result<Vec<PopulatedReaction>> {
    let mut populated = Vec::with_capacity(reactions.len());
    for bucket in reactions {
        let mut reacted_to_by = Vec::with_capacity(bucket.reacted_to_by.len());
        for user_id in &bucket.reacted_to_by {
            reacted_to_by.push(profile(store, *user_id).await?);
        }
        populated.push(PopulatedReaction { emoji: bucket.emoji.clone(), reacted_to_by });
    }
    Ok(populated)
}

pub(crate) async fn populate_message(
    store: &DocumentStore,
    message: &Message,
) -> Result<PopulatedMessage> {
    let sender = match message.sender {
        Some(id) => Some(profile(store, id).await?),
        None => None,
    };
    let mut thread_replies = Vec::with_capacity(message.thread_replies.len());
    for user_id in &message.thread_replies {
        thread_replies.push(profile(store, *user_id).await?);
    }
    Ok(PopulatedMessage {
        id: message.id,
        organisation: message.organisation,
        sender,
        content: message.content.clone(),
        channel: message.channel,
        conversation: message.conversation,
        collaborators: message.collaborators.clone(),
        is_self: message.is_self,
        has_read: message.has_read,
        reactions: populate_reactions(store, &message.reactions).await?,
        thread_replies,
        thread_replies_count: message.thread_replies_count,
        thread_last_reply_date: message.thread_last_reply_date,
        created_at: message.created_at,
    })
}

pub(crate) async fn populate_thread_reply(
    store: &DocumentStore,
    reply: &ThreadReply,
) -> Result<PopulatedThreadReply> {
    Ok(PopulatedThreadReply {
        id: reply.id,
        message: reply.message,
        sender: Some(profile(store, reply.sender).await?),
        content: reply.content.clone(),
        has_read: reply.has_read,
        reactions: populate_reactions(store, &reply.reactions).await?,
        created_at: reply.created_at,
    })
}
