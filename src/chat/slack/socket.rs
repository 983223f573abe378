use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::chat::slack::types::{Ack, Envelope, EventsApiPayload};
use crate::chat::slack::web::SlackWeb;
use crate::chat::{ChatError, ChatEvent, ChatResult};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How a single Socket Mode session ended without a transport error.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Slack asked us to reconnect (e.g. `refresh_requested`, `link_disabled`).
    Disconnect(String),
    /// Nobody is listening for events anymore.
    ReceiverClosed,
}

/// Keeps a Socket Mode session alive, forwarding events to `tx` until the receiving side is
/// dropped or Slack rejects the app token.
#[instrument(skip(web, tx))]
pub async fn run(web: SlackWeb, tx: UnboundedSender<ChatEvent>) -> ChatResult<()> {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let url = match web.connections_open().await {
            Ok(url) => url,
            Err(ChatError::InvalidAuth { error, .. }) => {
                error!(error = %error, "slack rejected the app token");
                let _ = tx.send(ChatEvent::InvalidAuth);
                return Ok(());
            }
            Err(e) => {
                error!(error = ?e, "unable to open a socket mode connection");
                if tx.send(ChatEvent::ConnectionError(e.to_string())).is_err() {
                    return Ok(());
                }

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        match connect_once(&url, &tx).await {
            Ok(SessionEnd::ReceiverClosed) => return Ok(()),
            Ok(SessionEnd::Disconnect(reason)) => {
                info!(reason = %reason, "slack requested a reconnect");
                backoff = INITIAL_BACKOFF;
                if tx.send(ChatEvent::ConnectionError(reason)).is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(error = ?e, "socket mode session failed");
                if tx.send(ChatEvent::ConnectionError(e.to_string())).is_err() {
                    return Ok(());
                }

                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }

        tokio::time::sleep(backoff).await;
    }
}

/// Runs one websocket session against `url`, acknowledging every envelope.
#[instrument(skip(url, tx))]
pub async fn connect_once(url: &str, tx: &UnboundedSender<ChatEvent>) -> ChatResult<SessionEnd> {
    let (stream, _) = connect_async(url).await?;
    let (mut writer, mut reader) = stream.split();

    while let Some(message) = reader.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!(?frame, "websocket closed by slack");
                return Err(ChatError::ConnectionClosed);
            }
            // tungstenite answers pings on its own
            _ => continue,
        };

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = ?e, raw = %text.as_str(), "unparseable socket mode frame");
                continue;
            }
        };

        if let Some(envelope_id) = envelope.envelope_id.as_deref() {
            let ack = serde_json::to_string(&Ack { envelope_id })?;
            writer.send(Message::text(ack)).await?;
        }

        let event = match envelope.kind.as_str() {
            "hello" => Some(ChatEvent::Connected {
                connection_count: envelope.num_connections.unwrap_or(1),
            }),
            "disconnect" => {
                let reason = envelope.reason.unwrap_or_else(|| String::from("unknown"));
                return Ok(SessionEnd::Disconnect(reason));
            }
            "events_api" => envelope
                .payload
                .and_then(|payload| {
                    serde_json::from_value::<EventsApiPayload>(payload)
                        .inspect_err(|e| warn!(error = ?e, "unrecognized events api payload"))
                        .ok()
                })
                .and_then(|payload| payload.event.into_chat_event()),
            other => Some(ChatEvent::Unknown(other.to_owned())),
        };

        if let Some(event) = event
            && tx.send(event).is_err()
        {
            return Ok(SessionEnd::ReceiverClosed);
        }
    }

    Err(ChatError::ConnectionClosed)
}
