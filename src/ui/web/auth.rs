use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderValue;
use http::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::instrument;
use uuid::Uuid;

use crate::ui::web::RouteError;
use crate::ui::{UiError, UiResult};

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL: Duration = Duration::from_secs(48 * 60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Hands out TOTP tokens for dashboard links and trades valid tokens for session cookies.
#[derive(Debug)]
pub struct Authenticator {
    totp: TOTP,
    sessions: RwLock<HashMap<Uuid, Instant>>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

impl Authenticator {
    /// `secret` is a base32-encoded TOTP secret.
    pub fn new(secret: &str) -> UiResult<Self> {
        let secret = Secret::Encoded(secret.to_owned())
            .to_bytes()
            .map_err(|e| UiError::InvalidTotp(format!("{e:?}")))?;

        let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, secret)
            .map_err(|e| UiError::InvalidTotp(e.to_string()))?;

        Ok(Self {
            totp,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// A fresh base32 secret suitable for `KARMABOT_WEBUI_TOTP`.
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    pub fn token(&self) -> UiResult<String> {
        Ok(self.totp.generate_current()?)
    }

    pub fn check_token(&self, token: &str) -> bool {
        self.totp.check_current(token).unwrap_or(false)
    }

    pub async fn create_session(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, Instant::now());

        id
    }

    pub async fn is_valid_session(&self, id: &Uuid) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|added| added.elapsed() < SESSION_TTL)
    }

    /// Drops every session older than [`SESSION_TTL`] as of `now`.
    pub async fn sweep_at(&self, now: Instant) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, added| now.saturating_duration_since(*added) < SESSION_TTL);

        if before != sessions.len() {
            tracing::debug!(expired = before - sessions.len(), "expired dashboard sessions");
        }
    }

    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                self.sweep_at(Instant::now()).await;
            }
        })
    }
}

/// Lets a request through when it carries a live session cookie, or a valid `token` query
/// parameter (which starts a new session).
#[instrument(skip_all, fields(uri = %req.uri().path()))]
pub async fn require_session(
    State(auth): State<Arc<Authenticator>>,
    Query(query): Query<TokenQuery>,
    req: Request,
    next: Next,
) -> Result<Response, RouteError> {
    if let Some(session) = session_cookie(&req)
        && auth.is_valid_session(&session).await
    {
        return Ok(next.run(req).await);
    }

    let Some(token) = query.token.filter(|token| auth.check_token(token)) else {
        return Err(RouteError::Unauthorized);
    };

    tracing::debug!(token_len = token.len(), "token accepted, starting a session");
    let session = auth.create_session().await;

    let mut res = next.run(req).await;
    let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        res.headers_mut().append(SET_COOKIE, value);
    }

    Ok(res)
}

fn session_cookie(req: &Request) -> Option<Uuid> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}
