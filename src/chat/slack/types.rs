use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatEvent, IncomingMessage, ReactionEvent};

/// A Socket Mode frame. Everything except `hello` and `disconnect` carries an `envelope_id` that
/// has to be acknowledged.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub envelope_id: Option<String>,
    pub payload: Option<Value>,
    pub reason: Option<String>,
    pub num_connections: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Ack<'a> {
    pub envelope_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct EventsApiPayload {
    pub event: SlackEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionPayload),
    ReactionRemoved(ReactionPayload),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessageEvent {
    pub user: Option<String>,
    pub channel: String,
    pub text: Option<String>,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionPayload {
    pub user: String,
    pub reaction: String,
    pub item_user: Option<String>,
    pub item: ReactionItem,
}

#[derive(Debug, Deserialize)]
pub struct ReactionItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: Option<String>,
}

/// Message subtypes that never carry a fresh command.
const IGNORED_SUBTYPES: [&str; 3] = ["message_changed", "message_deleted", "bot_message"];

impl SlackEvent {
    /// Maps a Slack event onto the transport-neutral event, dropping the ones the bot ignores:
    /// edits, deletions, bot posts and reactions on files. Other subtypes such as
    /// `thread_broadcast` or `file_share` still count when they carry a user and text.
    pub fn into_chat_event(self) -> Option<ChatEvent> {
        match self {
            SlackEvent::Message(msg) => {
                let ignored = msg
                    .subtype
                    .as_deref()
                    .is_some_and(|subtype| IGNORED_SUBTYPES.contains(&subtype));
                if ignored || msg.bot_id.is_some() {
                    return None;
                }

                Some(ChatEvent::Message(IncomingMessage {
                    user: msg.user?,
                    channel: msg.channel,
                    text: msg.text?,
                    ts: msg.ts,
                    thread_ts: msg.thread_ts,
                }))
            }
            SlackEvent::ReactionAdded(reaction) => {
                reaction.into_reaction().map(ChatEvent::ReactionAdded)
            }
            SlackEvent::ReactionRemoved(reaction) => {
                reaction.into_reaction().map(ChatEvent::ReactionRemoved)
            }
            SlackEvent::Other => None,
        }
    }
}

impl ReactionPayload {
    fn into_reaction(self) -> Option<ReactionEvent> {
        if self.item.kind != "message" {
            return None;
        }

        Some(ReactionEvent {
            user: self.user,
            item_user: self.item_user?,
            reaction: self.reaction,
            channel: self.item.channel?,
        })
    }
}
