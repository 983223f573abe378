use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::chat::ChatEvent;
use crate::karma::Bot;
use crate::karma::reaction::ReactionKind;

pub type DispatchResult<T> = core::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("the chat platform rejected the bot's credentials")]
    InvalidAuth,
}

/// Consumes `events` until the transport closes the stream, handling each event in its own task.
///
/// Returns early with [`DispatchError::InvalidAuth`] when the transport reports bad credentials.
#[instrument(skip_all)]
pub async fn listen(bot: Arc<Bot>, mut events: UnboundedReceiver<ChatEvent>) -> DispatchResult<()> {
    let mut tasks = JoinSet::new();

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Message(msg) => {
                let bot = bot.clone();
                tasks.spawn(async move { bot.handle_message(&msg).await });
            }

            ChatEvent::ReactionAdded(reaction) => {
                let bot = bot.clone();
                tasks.spawn(async move {
                    bot.handle_reaction(&reaction, ReactionKind::Added).await
                });
            }

            ChatEvent::ReactionRemoved(reaction) => {
                let bot = bot.clone();
                tasks.spawn(async move {
                    bot.handle_reaction(&reaction, ReactionKind::Removed).await
                });
            }

            ChatEvent::Connected { connection_count } => {
                info!(connection_count, "connected to chat");
            }

            ChatEvent::ConnectionError(reason) => {
                warn!(reason = %reason, "chat connection error");
            }

            ChatEvent::InvalidAuth => {
                error!("invalid credentials, shutting down");
                return Err(DispatchError::InvalidAuth);
            }

            ChatEvent::Unknown(kind) => {
                debug!(kind = %kind, "ignoring unhandled event");
            }
        }

        while let Some(done) = tasks.try_join_next() {
            reap(done);
        }
    }

    info!(pending = tasks.len(), "event stream closed");
    while let Some(done) = tasks.join_next().await {
        reap(done);
    }

    Ok(())
}

fn reap(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!(error = ?e, "event handler panicked");
    }
}
