//! Shared fixtures for tq-catalog integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tq_catalog::config::CatalogSettings;
use tq_catalog::models::CatalogItem;
use tq_catalog::AppState;
use tq_common::{ManualClock, SharedClock};

/// On-disk database, a manual clock and the full service graph
pub struct TestHarness {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub clock: ManualClock,
    pub state: AppState,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_settings(CatalogSettings::default()).await
    }

    pub async fn with_settings(settings: CatalogSettings) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let pool = tq_common::db::init_database(&dir.path().join("tunequiz.db"))
            .await
            .expect("Failed to initialize database");
        let clock = ManualClock::new(t0());
        let shared: SharedClock = Arc::new(clock.clone());
        let state = AppState::new(pool.clone(), shared, settings);

        Self {
            _dir: dir,
            pool,
            clock,
            state,
        }
    }

    /// Add `count` items for `artist`, all at the current clock instant
    pub async fn add_items(&self, artist: &str, count: usize) -> Vec<CatalogItem> {
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let item = self
                .state
                .catalog
                .add_item(artist, &format!("{} song {}", artist, i))
                .await
                .expect("Failed to add item");
            items.push(item);
        }
        items
    }
}
