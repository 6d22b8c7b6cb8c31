//! Game session endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Difficulty, GameSession, SessionResult, SessionRound};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub player_id: Uuid,
    pub artist: String,
    /// EASY / NORMAL / HARD, any case; NORMAL when omitted
    pub difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub item_id: Uuid,
    pub correct: bool,
}

#[derive(Debug, Deserialize)]
pub struct FinishSessionRequest {
    pub duration_ms: i64,
}

/// POST /sessions
pub async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> ApiResult<(StatusCode, Json<GameSession>)> {
    let difficulty = match payload.difficulty.as_deref() {
        Some(raw) => raw.parse::<Difficulty>()?,
        None => Difficulty::default(),
    };

    let session = state
        .sessions
        .start_session(payload.player_id, &payload.artist, difficulty)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<GameSession>> {
    Ok(Json(state.sessions.get_session(session_id).await?))
}

/// POST /sessions/:id/answers
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> ApiResult<Json<SessionRound>> {
    let round = state
        .sessions
        .submit_answer(session_id, payload.item_id, payload.correct)
        .await?;
    Ok(Json(round))
}

/// POST /sessions/:id/finish
pub async fn finish_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<FinishSessionRequest>,
) -> ApiResult<Json<SessionResult>> {
    Ok(Json(
        state
            .sessions
            .finish_session(session_id, payload.duration_ms)
            .await?,
    ))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/answers", post(submit_answer))
        .route("/sessions/:id/finish", post(finish_session))
}
