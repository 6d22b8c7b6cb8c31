//! Catalog mutation and temporal query endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CatalogItem, HistoryEvent, MutationOutcome};
use crate::{ApiResult, AppState};

/// POST /catalog/items request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub artist: String,
    pub title: String,
}

/// Delete / restore response
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    pub guid: Uuid,
    pub outcome: MutationOutcome,
}

#[derive(Debug, Deserialize)]
pub struct ActiveCountQuery {
    /// RFC 3339 instant; omitted means "now"
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveCountResponse {
    pub artist: String,
    pub at: DateTime<Utc>,
    pub active_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub artist: String,
    pub mismatched: Vec<Uuid>,
}

/// POST /catalog/items
pub async fn add_item(
    State(state): State<AppState>,
    Json(payload): Json<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<CatalogItem>)> {
    let item = state.catalog.add_item(&payload.artist, &payload.title).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /catalog/items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<CatalogItem>> {
    Ok(Json(state.catalog.get_item(item_id).await?))
}

/// GET /catalog/items/:id/history
pub async fn item_history(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<Vec<HistoryEvent>>> {
    Ok(Json(state.catalog.item_history(item_id).await?))
}

/// POST /catalog/items/:id/delete
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<MutationResponse>> {
    let outcome = state.catalog.soft_delete(item_id).await?;
    Ok(Json(MutationResponse {
        guid: item_id,
        outcome,
    }))
}

/// POST /catalog/items/:id/restore
pub async fn restore_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<MutationResponse>> {
    let outcome = state.catalog.restore(item_id).await?;
    Ok(Json(MutationResponse {
        guid: item_id,
        outcome,
    }))
}

/// GET /catalog/artists/:artist/items
pub async fn list_items(
    State(state): State<AppState>,
    Path(artist): Path<String>,
    Query(query): Query<ListItemsQuery>,
) -> ApiResult<Json<Vec<CatalogItem>>> {
    Ok(Json(
        state
            .catalog
            .list_items(&artist, query.include_inactive)
            .await?,
    ))
}

/// GET /catalog/artists/:artist/active
pub async fn active_count(
    State(state): State<AppState>,
    Path(artist): Path<String>,
    Query(query): Query<ActiveCountQuery>,
) -> ApiResult<Json<ActiveCountResponse>> {
    let at = query.at.unwrap_or_else(|| state.clock.now());
    let active_count = state.temporal.count_active_at(&artist, at).await?;

    Ok(Json(ActiveCountResponse {
        artist,
        at,
        active_count,
    }))
}

/// GET /catalog/artists/:artist/audit
///
/// Items whose cached active flag disagrees with the history log.
pub async fn audit_artist(
    State(state): State<AppState>,
    Path(artist): Path<String>,
) -> ApiResult<Json<AuditResponse>> {
    let mismatched = state.temporal.audit_artist(&artist).await?;
    Ok(Json(AuditResponse { artist, mismatched }))
}

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/catalog/items", post(add_item))
        .route("/catalog/items/:id", get(get_item))
        .route("/catalog/items/:id/history", get(item_history))
        .route("/catalog/items/:id/delete", post(delete_item))
        .route("/catalog/items/:id/restore", post(restore_item))
        .route("/catalog/artists/:artist/items", get(list_items))
        .route("/catalog/artists/:artist/active", get(active_count))
        .route("/catalog/artists/:artist/audit", get(audit_artist))
}
