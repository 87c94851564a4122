//! REST surface: game CRUD, snapshots, rotation, history.
//!
//! All handlers delegate to the same [`GameService`] operations the
//! realtime coordinator uses; this layer only maps errors to HTTP statuses.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use fleche_core::ids::GridId;
use fleche_engine::service::game_info;
use fleche_engine::GameError;

use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/games", get(list_games).post(create_game))
        .route("/api/games/join", post(join_game))
        .route("/api/games/{code}", get(get_game).delete(delete_game))
        .route("/api/games/{code}/next", post(next_grid))
        .route("/api/games/{code}/history", get(history))
        .route("/api/games/{code}/history/{grid_id}", get(history_grid))
}

/// `GameError` → HTTP response with a JSON `{ "error": … }` body.
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Forbidden(_) => StatusCode::FORBIDDEN,
            GameError::Generation(_) | GameError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGameBody {
    owner_pseudo: String,
    theme: Option<String>,
    difficulty: Option<String>,
}

async fn create_game(
    State(state): State<AppState>,
    Json(body): Json<CreateGameBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (game, _grid) = state.service.create_game(
        &body.owner_pseudo,
        body.theme.as_deref().unwrap_or("general"),
        body.difficulty.as_deref().unwrap_or("easy"),
        None,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "code": game.code,
            "gameId": game.id,
            "ownerPseudo": game.owner_pseudo,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct JoinGameBody {
    code: String,
    pseudo: String,
    color: String,
}

async fn join_game(
    State(state): State<AppState>,
    Json(body): Json<JoinGameBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (game, _player) = state.service.join_game(&body.code, &body.pseudo, &body.color)?;
    Ok(Json(serde_json::json!({
        "gameId": game.id,
        "code": game.code,
        "ownerPseudo": game.owner_pseudo,
        "theme": game.theme,
        "difficulty": game.difficulty,
    })))
}

async fn list_games(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let games = state.service.list_active()?;
    Ok(Json(serde_json::json!({ "games": games })))
}

async fn get_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.service.snapshot(&code)?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerBody {
    owner_pseudo: String,
}

async fn next_grid(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<OwnerBody>,
) -> Result<impl IntoResponse, ApiError> {
    let grid = state.service.next_grid(&code, &body.owner_pseudo, None)?;
    let game = state.service.get_game(&code)?;
    Ok(Json(serde_json::json!({
        "game": game_info(&game),
        "grid": fleche_engine::service::grid_info(&grid),
    })))
}

async fn delete_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<OwnerBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_game(&code, &body.owner_pseudo)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn history(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.service.history(&code)?;
    Ok(Json(serde_json::json!({ "history": history })))
}

async fn history_grid(
    State(state): State<AppState>,
    Path((code, grid_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (archive, claims) = state
        .service
        .history_grid(&code, &GridId::from_raw(grid_id))?;
    Ok(Json(serde_json::json!({
        "grid": {
            "id": archive.grid.id,
            "indexNumber": archive.grid.index_number,
            "layout": archive.grid.layout,
            "createdAt": archive.grid.created_at,
            "completedAt": archive.grid.completed_at,
        },
        "finalCells": archive.final_cells,
        "finalScores": archive.final_scores,
        "claims": claims,
    })))
}
