use std::sync::Arc;
use std::time::Duration;

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use leaky_bucket::RateLimiter;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::chat::{ChatError, ChatResult, ChatUser};

pub const SLACK_API_URL: &str = "https://slack.com/api";

/// Slack errors meaning the token itself is unusable.
const AUTH_ERRORS: [&str; 4] = [
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
];

/// Thin Slack Web API client.
///
/// Posting methods share a leaky bucket so bursts of replies don't trip Slack's per-channel
/// limit of roughly one message per second.
#[derive(Debug, Clone)]
pub struct SlackWeb {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    app_token: String,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsOpen {
    channel: SlackChannel,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthTest {
    user: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

impl SlackWeb {
    pub fn new(bot_token: &str, app_token: &str) -> Self {
        Self::with_base_url(SLACK_API_URL, bot_token, app_token)
    }

    pub fn with_base_url(base_url: &str, bot_token: &str, app_token: &str) -> Self {
        let limiter = RateLimiter::builder()
            .max(3)
            .initial(3)
            .refill(1)
            .interval(Duration::from_secs(1))
            .build();

        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            bot_token: bot_token.to_owned(),
            app_token: app_token.to_owned(),
            limiter: Arc::new(limiter),
        }
    }

    #[instrument(skip(self))]
    pub async fn users_info(&self, id: &str) -> ChatResult<ChatUser> {
        let res = self
            .client
            .get(self.method_url("users.info"))
            .headers(auth_headers(&self.bot_token)?)
            .query(&[("user", id)])
            .send()
            .await?;

        let info: UserInfo = match parse_response("users.info", res).await {
            Ok(info) => info,
            Err(ChatError::Api { error, .. }) if error == "user_not_found" => {
                return Err(ChatError::UnknownUser(id.to_owned()));
            }
            Err(e) => return Err(e),
        };

        Ok(ChatUser {
            id: info.user.id,
            name: info.user.name,
        })
    }

    #[instrument(skip(self, text))]
    pub async fn post_message(
        &self,
        text: &str,
        channel: &str,
        thread_ts: Option<&str>,
    ) -> ChatResult<()> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::from(ts);
        }

        self.limiter.acquire_one().await;
        self.post::<Value>("chat.postMessage", &self.bot_token, Some(&body))
            .await?;

        Ok(())
    }

    #[instrument(skip(self, text))]
    pub async fn post_ephemeral(
        &self,
        text: &str,
        channel: &str,
        user: &str,
        thread_ts: Option<&str>,
    ) -> ChatResult<()> {
        let mut body = json!({ "channel": channel, "user": user, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::from(ts);
        }

        self.limiter.acquire_one().await;
        self.post::<Value>("chat.postEphemeral", &self.bot_token, Some(&body))
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn conversations_open(&self, user: &str) -> ChatResult<String> {
        let body = json!({ "users": user });
        let opened: ConversationsOpen = self
            .post("conversations.open", &self.bot_token, Some(&body))
            .await?;

        Ok(opened.channel.id)
    }

    /// Checks the bot token and returns the bot's own username.
    #[instrument(skip(self))]
    pub async fn auth_test(&self) -> ChatResult<String> {
        let identity: AuthTest = self.post("auth.test", &self.bot_token, None).await?;
        Ok(identity.user)
    }

    /// Requests a fresh Socket Mode websocket URL (uses the app-level token).
    #[instrument(skip(self))]
    pub async fn connections_open(&self) -> ChatResult<String> {
        let opened: ConnectionsOpen = self
            .post("apps.connections.open", &self.app_token, None)
            .await?;

        Ok(opened.url)
    }

    async fn post<T>(&self, method: &str, token: &str, body: Option<&Value>) -> ChatResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut req = self
            .client
            .post(self.method_url(method))
            .headers(auth_headers(token)?);

        if let Some(body) = body {
            req = req.json(body);
        }

        parse_response(method, req.send().await?).await
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }
}

fn auth_headers(token: &str) -> ChatResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );

    Ok(headers)
}

/// Slack answers `200 OK` even for failed calls, so the `ok` flag decides success and `error`
/// carries the reason.
async fn parse_response<T>(method: &str, res: reqwest::Response) -> ChatResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = res.status();
    if !status.is_success() {
        tracing::error!(code = %status, method, "non-2xx response from slack");
        return Err(ChatError::Api {
            method: method.to_owned(),
            error: status.to_string(),
        });
    }

    let body: Value = res.json().await?;
    if body["ok"].as_bool() != Some(true) {
        let error = body["error"].as_str().unwrap_or("unknown_error").to_owned();
        tracing::error!(method, error = %error, "slack api call failed");

        if AUTH_ERRORS.contains(&error.as_str()) {
            return Err(ChatError::InvalidAuth {
                method: method.to_owned(),
                error,
            });
        }

        return Err(ChatError::Api {
            method: method.to_owned(),
            error,
        });
    }

    Ok(serde_json::from_value(body)?)
}
