use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::Redirect;
use http::Uri;
use serde::Serialize;
use tracing::instrument;

use crate::ui::web::{JsonResult, RouteError, WebState};

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub limit: u32,
    pub total_points: i64,
    pub leaderboard: Vec<RankedEntry>,
}

#[derive(Debug, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub name: String,
    pub points: i64,
}

pub async fn home() -> Redirect {
    Redirect::to("/leaderboard")
}

#[instrument(skip(state))]
pub async fn default_leaderboard(
    State(state): State<Arc<WebState>>,
) -> JsonResult<LeaderboardResponse> {
    leaderboard(&state, state.leaderboard_limit).await
}

#[instrument(skip(state))]
pub async fn leaderboard_with_limit(
    State(state): State<Arc<WebState>>,
    Path(limit): Path<String>,
) -> JsonResult<LeaderboardResponse> {
    let limit = limit
        .parse::<u32>()
        .map_err(|_| RouteError::InvalidLimit(limit))?;

    leaderboard(&state, limit).await
}

pub async fn not_found(uri: Uri) -> RouteError {
    RouteError::NotFound(uri.path().to_owned())
}

async fn leaderboard(state: &WebState, limit: u32) -> JsonResult<LeaderboardResponse> {
    let total_points = state.store.get_total_absolute_points().await?;
    let leaderboard = state
        .store
        .get_leaderboard(limit)
        .await?
        .into_iter()
        .enumerate()
        .map(|(i, user)| RankedEntry {
            rank: i + 1,
            name: user.name,
            points: user.points,
        })
        .collect();

    Ok(Json(LeaderboardResponse {
        limit,
        total_points,
        leaderboard,
    }))
}
