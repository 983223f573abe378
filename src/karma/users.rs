use std::sync::Arc;

use regex::Regex;
use tracing::instrument;

use crate::chat::{ChatPort, ChatResult};
use crate::config::Config;

/// A Slack-style `<@ID>` mention.
const MENTION: &str = r"^<@([A-Za-z0-9]+)>$";

/// Turns raw user tokens and platform ids into canonical (lowercase, de-aliased) usernames.
#[derive(Debug)]
pub struct UserResolver {
    chat: Arc<dyn ChatPort>,
    config: Arc<Config>,
    mention: Regex,
}

impl UserResolver {
    pub fn new(chat: Arc<dyn ChatPort>, config: Arc<Config>) -> Result<Self, regex::Error> {
        Ok(Self {
            chat,
            config,
            mention: Regex::new(MENTION)?,
        })
    }

    /// The platform id wrapped in `token`, if it is a mention.
    pub fn mention_id<'a>(&self, token: &'a str) -> Option<&'a str> {
        Some(self.mention.captures(token)?.get(1)?.as_str())
    }

    /// Resolves a token captured from a command: mentions go through the chat transport, anything
    /// else is taken as a username.
    #[instrument(skip(self))]
    pub async fn resolve(&self, token: &str) -> ChatResult<String> {
        match self.mention_id(token) {
            Some(id) => self.resolve_id(id).await,
            None => Ok(self.canonical(token)),
        }
    }

    /// Resolves a verified platform user id (e.g. the author of a message).
    #[instrument(skip(self))]
    pub async fn resolve_id(&self, id: &str) -> ChatResult<String> {
        let user = self.chat.lookup_user(id).await?;
        Ok(self.canonical(&user.name))
    }

    pub fn canonical(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        self.config.aliases.resolve(&lowered).to_owned()
    }
}
