//! Achievement ranking endpoint

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::models::RankingRow;
use crate::services::ranking::DEFAULT_RANKING_LIMIT;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    pub limit: Option<u32>,
}

/// GET /achievements/:artist/ranking
pub async fn ranking(
    State(state): State<AppState>,
    Path(artist): Path<String>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<Json<Vec<RankingRow>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RANKING_LIMIT);
    Ok(Json(state.ranking.ranking(&artist, limit).await?))
}

pub fn achievement_routes() -> Router<AppState> {
    Router::new().route("/achievements/:artist/ranking", get(ranking))
}
