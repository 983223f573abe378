use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::chat::{ChatError, ChatPort, ChatResult, ChatUser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Message {
        text: String,
        channel: String,
        thread: Option<String>,
    },
    Ephemeral {
        text: String,
        channel: String,
        user: String,
        thread: Option<String>,
    },
}

impl SentMessage {
    pub fn text(&self) -> &str {
        match self {
            SentMessage::Message { text, .. } | SentMessage::Ephemeral { text, .. } => text,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            SentMessage::Message { channel, .. } | SentMessage::Ephemeral { channel, .. } => {
                channel
            }
        }
    }
}

/// Records everything the bot sends.
///
/// User ids resolve to themselves unless a display name was registered with
/// [`TestChat::with_user`]; ids listed through [`TestChat::with_unknown`] fail to resolve. A DM
/// channel with a user shares that user's id.
#[derive(Debug, Default)]
pub struct TestChat {
    names: HashMap<String, String>,
    unknown: Vec<String>,
    sent: Mutex<Vec<SentMessage>>,
}

impl TestChat {
    pub fn with_user(mut self, id: &str, name: &str) -> Self {
        self.names.insert(id.to_owned(), name.to_owned());
        self
    }

    pub fn with_unknown(mut self, id: &str) -> Self {
        self.unknown.push(id.to_owned());
        self
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|m| m.text().to_owned())
            .collect()
    }
}

#[async_trait::async_trait]
impl ChatPort for TestChat {
    async fn lookup_user(&self, id: &str) -> ChatResult<ChatUser> {
        if self.unknown.iter().any(|u| u == id) {
            return Err(ChatError::UnknownUser(id.to_owned()));
        }

        let name = self.names.get(id).cloned().unwrap_or_else(|| id.to_owned());
        Ok(ChatUser {
            id: id.to_owned(),
            name,
        })
    }

    async fn send_message(
        &self,
        text: &str,
        channel: &str,
        thread: Option<&str>,
    ) -> ChatResult<()> {
        self.sent.lock().await.push(SentMessage::Message {
            text: text.to_owned(),
            channel: channel.to_owned(),
            thread: thread.map(str::to_owned),
        });

        Ok(())
    }

    async fn send_ephemeral(
        &self,
        text: &str,
        channel: &str,
        user: &str,
        thread: Option<&str>,
    ) -> ChatResult<()> {
        self.sent.lock().await.push(SentMessage::Ephemeral {
            text: text.to_owned(),
            channel: channel.to_owned(),
            user: user.to_owned(),
            thread: thread.map(str::to_owned),
        });

        Ok(())
    }

    async fn open_direct_channel(&self, user: &str) -> ChatResult<String> {
        Ok(user.to_owned())
    }
}
