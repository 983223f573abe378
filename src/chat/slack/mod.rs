use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, instrument};

use crate::chat::{ChatError, ChatEvent, ChatPort, ChatResult, ChatUser};

pub mod socket;
pub mod types;
pub mod web;

pub use web::SlackWeb;

/// Production chat transport: Web API calls for the outgoing side, Socket Mode for events.
///
/// Once listening, a bot-token call rejected by Slack also shows up on the event stream as
/// [`ChatEvent::InvalidAuth`].
#[derive(Debug, Clone)]
pub struct SlackClient {
    web: SlackWeb,
    events: Arc<OnceLock<UnboundedSender<ChatEvent>>>,
}

impl SlackClient {
    pub fn new(bot_token: &str, app_token: &str) -> Self {
        Self::with_web(SlackWeb::new(bot_token, app_token))
    }

    pub fn with_web(web: SlackWeb) -> Self {
        Self {
            web,
            events: Arc::new(OnceLock::new()),
        }
    }

    /// Checks the bot token against `auth.test`, returning the bot's username.
    pub async fn verify(&self) -> ChatResult<String> {
        self.web.auth_test().await
    }

    /// Starts the Socket Mode session in the background and returns its event stream.
    pub fn listen(&self) -> (UnboundedReceiver<ChatEvent>, JoinHandle<ChatResult<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.attach(tx.clone());
        let handle = tokio::spawn(socket::run(self.web.clone(), tx));

        (rx, handle)
    }

    fn attach(&self, tx: UnboundedSender<ChatEvent>) {
        if self.events.set(tx).is_err() {
            error!("slack client is already listening; keeping the first event stream");
        }
    }

    fn watch<T>(&self, res: ChatResult<T>) -> ChatResult<T> {
        if let Err(ChatError::InvalidAuth { method, error }) = &res {
            error!(method = %method, error = %error, "slack rejected the bot token");
            if let Some(tx) = self.events.get() {
                let _ = tx.send(ChatEvent::InvalidAuth);
            }
        }

        res
    }
}

#[async_trait::async_trait]
impl ChatPort for SlackClient {
    #[instrument(skip(self))]
    async fn lookup_user(&self, id: &str) -> ChatResult<ChatUser> {
        self.watch(self.web.users_info(id).await)
    }

    #[instrument(skip(self, text))]
    async fn send_message(
        &self,
        text: &str,
        channel: &str,
        thread: Option<&str>,
    ) -> ChatResult<()> {
        self.watch(self.web.post_message(text, channel, thread).await)
    }

    #[instrument(skip(self, text))]
    async fn send_ephemeral(
        &self,
        text: &str,
        channel: &str,
        user: &str,
        thread: Option<&str>,
    ) -> ChatResult<()> {
        self.watch(self.web.post_ephemeral(text, channel, user, thread).await)
    }

    #[instrument(skip(self))]
    async fn open_direct_channel(&self, user: &str) -> ChatResult<String> {
        self.watch(self.web.conversations_open(user).await)
    }
}
