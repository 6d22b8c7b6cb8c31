//! tq-catalog library interface
//!
//! Song catalog with soft delete and an append-only history log, point-in-time
//! counts, perfect-clear achievements reconciled against the live catalog,
//! rankings and game session snapshots. Exposed over HTTP by the binary.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tq_common::SharedClock;

use crate::config::CatalogSettings;
use crate::services::{
    AchievementStore, CatalogStore, RankingAggregator, ReconciliationBatch, RetentionCleaner,
    SessionService, TemporalQueryEngine,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub clock: SharedClock,
    pub settings: CatalogSettings,
    pub catalog: CatalogStore,
    pub temporal: TemporalQueryEngine,
    pub retention: RetentionCleaner,
    pub reconciliation: ReconciliationBatch,
    pub ranking: RankingAggregator,
    pub achievements: AchievementStore,
    pub sessions: SessionService,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, clock: SharedClock, settings: CatalogSettings) -> Self {
        let max_wait = settings.db_max_lock_wait_ms;
        let temporal = TemporalQueryEngine::new(db.clone(), clock.clone());

        Self {
            catalog: CatalogStore::new(db.clone(), clock.clone(), max_wait),
            retention: RetentionCleaner::new(db.clone(), clock.clone(), settings.retention_window()),
            reconciliation: ReconciliationBatch::new(
                db.clone(),
                clock.clone(),
                temporal.clone(),
                settings.stale_after(),
                settings.lease_ttl(),
            ),
            ranking: RankingAggregator::new(db.clone(), temporal.clone(), settings.ranking_max_limit),
            achievements: AchievementStore::new(db.clone(), clock.clone()),
            sessions: SessionService::new(db.clone(), clock.clone(), max_wait),
            startup_time: clock.now(),
            temporal,
            settings,
            clock,
            db,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::catalog_routes())
        .merge(api::achievement_routes())
        .merge(api::session_routes())
        .merge(api::batch_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
