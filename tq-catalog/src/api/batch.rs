//! Batch triggers for external schedulers

use axum::{extract::State, routing::post, Json, Router};

use crate::models::ReconciliationReport;
use crate::services::RetentionReport;
use crate::{ApiResult, AppState};

/// POST /reconciliation/run
///
/// 409 when another run holds the reconciliation lease.
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> ApiResult<Json<ReconciliationReport>> {
    Ok(Json(state.reconciliation.execute().await?))
}

/// POST /retention/run
pub async fn run_retention(State(state): State<AppState>) -> ApiResult<Json<RetentionReport>> {
    Ok(Json(state.retention.run().await?))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/reconciliation/run", post(run_reconciliation))
        .route("/retention/run", post(run_retention))
}
