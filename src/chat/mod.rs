use std::fmt;

use thiserror::Error;

pub mod slack;

#[cfg(test)]
pub mod testing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
}

/// A plain message posted by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    pub user: String,
    pub channel: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

/// A reaction added to (or removed from) a message; `item_user` authored the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub user: String,
    pub item_user: String,
    pub reaction: String,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(IncomingMessage),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    Connected { connection_count: u32 },
    ConnectionError(String),
    InvalidAuth,
    Unknown(String),
}

/// Outgoing side of the chat transport.
#[async_trait::async_trait]
pub trait ChatPort: Send + Sync + fmt::Debug {
    /// Resolves an opaque platform user id to that user's name.
    async fn lookup_user(&self, id: &str) -> ChatResult<ChatUser>;

    async fn send_message(&self, text: &str, channel: &str, thread: Option<&str>)
    -> ChatResult<()>;

    /// Posts a message in `channel` (inside `thread`, if given) that only `user` can see.
    async fn send_ephemeral(
        &self,
        text: &str,
        channel: &str,
        user: &str,
        thread: Option<&str>,
    ) -> ChatResult<()>;

    /// Opens (or reuses) a direct-message channel with `user` and returns its id.
    async fn open_direct_channel(&self, user: &str) -> ChatResult<String>;
}

pub type ChatResult<T> = core::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("{method} rejected the token: {error}")]
    InvalidAuth { method: String, error: String },

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Header(#[from] http::header::InvalidHeaderValue),

    #[error("connection closed")]
    ConnectionClosed,
}
