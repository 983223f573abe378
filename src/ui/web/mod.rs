use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::config::WebUiSettings;
use crate::db::{DbError, Store};
use crate::ui::{UiError, UiPort, UiResult};

pub mod auth;
pub mod handlers;

use auth::Authenticator;
use handlers::*;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Debug)]
pub struct WebState {
    pub store: Arc<dyn Store>,
    pub leaderboard_limit: u32,
}

/// The authenticated dashboard: hands out tokenized links and serves the JSON leaderboard.
#[derive(Debug, Clone)]
pub struct WebUi {
    settings: WebUiSettings,
    auth: Arc<Authenticator>,
}

impl WebUi {
    pub fn new(settings: &WebUiSettings) -> UiResult<Self> {
        let Some(secret) = settings.totp_secret.as_deref() else {
            return Err(UiError::MissingTotp {
                generated: Authenticator::generate_secret(),
            });
        };

        Ok(Self {
            settings: settings.clone(),
            auth: Arc::new(Authenticator::new(secret)?),
        })
    }

    /// Binds the configured listen address and serves until the server fails.
    #[instrument(skip(self, store), fields(listen_addr = %self.settings.listen_addr))]
    pub async fn serve(&self, store: Arc<dyn Store>) -> UiResult<()> {
        let listener = TcpListener::bind(&self.settings.listen_addr).await?;
        tracing::info!(url = %self.settings.url, "webui listening");

        self.serve_on(listener, store).await
    }

    pub async fn serve_on(&self, listener: TcpListener, store: Arc<dyn Store>) -> UiResult<()> {
        let sweeper = self.auth.clone().spawn_sweeper();
        let state = Arc::new(WebState {
            store,
            leaderboard_limit: self.settings.leaderboard_limit,
        });

        let result = axum::serve(listener, router(state, self.auth.clone())).await;
        sweeper.abort();

        Ok(result?)
    }
}

impl UiPort for WebUi {
    fn get_url(&self, path: &str) -> UiResult<Option<String>> {
        let token = self.auth.token()?;
        Ok(Some(format!("{}{path}?token={token}", self.settings.url)))
    }
}

pub fn router(state: Arc<WebState>, auth: Arc<Authenticator>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/leaderboard", get(default_leaderboard))
        .route("/leaderboard/{limit}", get(leaderboard_with_limit))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(auth, auth::require_session))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("webui_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    QueryError(#[from] DbError),

    #[error("invalid leaderboard limit '{0}'")]
    InvalidLimit(String),

    #[error("page [{0}] not found")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message, err) = match &self {
            RouteError::QueryError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                Some(self),
            ),

            RouteError::InvalidLimit(_) => (StatusCode::BAD_REQUEST, self.to_string(), None),

            RouteError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), None),

            RouteError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                String::from(
                    r#"Your session has expired. Please type "karmabot web" and click on the generated url."#,
                ),
                None,
            ),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}

#[cfg(test)]
mod test {
    use http::header::{COOKIE, LOCATION, SET_COOKIE};
    use serde_json::{Value, json};

    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::NewRecord;

    struct Harness {
        base: String,
        ui: WebUi,
        client: reqwest::Client,
    }

    async fn harness() -> Harness {
        let store = MemoryStore::with_records(&[
            NewRecord::new("a", "alice", 5, None),
            NewRecord::new("a", "bob", 3, None),
            NewRecord::new("a", "carol", -2, None),
        ])
        .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let settings = WebUiSettings {
            listen_addr: addr.to_string(),
            url: format!("http://{addr}"),
            totp_secret: Some(Authenticator::generate_secret()),
            leaderboard_limit: 2,
        };

        let ui = WebUi::new(&settings).unwrap();
        let server = ui.clone();
        tokio::spawn(async move { server.serve_on(listener, Arc::new(store)).await });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Harness {
            base: format!("http://{addr}"),
            ui,
            client,
        }
    }

    impl Harness {
        async fn session(&self) -> String {
            let url = self.ui.get_url("/leaderboard").unwrap().unwrap();
            let res = self.client.get(url).send().await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);

            let cookie = res.headers()[SET_COOKIE].to_str().unwrap();
            cookie.split(';').next().unwrap().to_owned()
        }

        async fn get(&self, path: &str, cookie: &str) -> reqwest::Response {
            self.client
                .get(format!("{}{path}", self.base))
                .header(COOKIE, cookie)
                .send()
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_missing_totp_suggests_secret() {
        let settings = WebUiSettings {
            listen_addr: "127.0.0.1:0".into(),
            url: "http://localhost".into(),
            totp_secret: None,
            leaderboard_limit: 10,
        };

        let err = WebUi::new(&settings).unwrap_err();
        assert!(matches!(err, UiError::MissingTotp { ref generated } if !generated.is_empty()));
    }

    #[tokio::test]
    async fn test_unauthenticated_rejected() {
        let h = harness().await;
        let res = h.get("/leaderboard", "").await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        assert!(body["message"].as_str().unwrap().contains("karmabot web"));

        let res = h
            .client
            .get(format!("{}/leaderboard?token=000000x", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_grants_session() {
        let h = harness().await;
        let cookie = h.session().await;
        assert!(cookie.starts_with("session="));

        let res = h.get("/leaderboard", &cookie).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = res.json().await.unwrap();
        assert_eq!(
            body,
            json!({
                "limit": 2,
                "total_points": 10,
                "leaderboard": [
                    { "rank": 1, "name": "alice", "points": 5 },
                    { "rank": 2, "name": "bob", "points": 3 }
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_routes() {
        let h = harness().await;
        let cookie = h.session().await;

        let res = h.get("/", &cookie).await;
        assert!(res.status().is_redirection());
        assert_eq!(res.headers()[LOCATION], "/leaderboard");

        let res = h.get("/leaderboard/10", &cookie).await;
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["limit"], 10);
        assert_eq!(body["leaderboard"].as_array().unwrap().len(), 3);
        assert_eq!(body["leaderboard"][2]["name"], "carol");

        let res = h.get("/leaderboard/lots", &cookie).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = h.get("/nope", &cookie).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "page [/nope] not found");
    }
}
