//! Ranking Aggregator
//!
//! Combines the achieved-time snapshot of each record with the artist's live
//! catalog size. Rows are sorted into a total order so repeated reads with
//! unchanged state always produce the same ranking.

use sqlx::SqlitePool;
use std::cmp::Ordering;
use tq_common::{Error, Result};

use super::TemporalQueryEngine;
use crate::db;
use crate::models::{AchievementRecord, RankingRow};

/// Limit used by the HTTP layer when none is given
pub const DEFAULT_RANKING_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct RankingAggregator {
    db: SqlitePool,
    temporal: TemporalQueryEngine,
    max_limit: u32,
}

impl RankingAggregator {
    pub fn new(db: SqlitePool, temporal: TemporalQueryEngine, max_limit: u32) -> Self {
        Self {
            db,
            temporal,
            max_limit,
        }
    }

    pub async fn ranking(&self, artist: &str, limit: u32) -> Result<Vec<RankingRow>> {
        if limit == 0 || limit > self.max_limit {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}, got {}",
                self.max_limit, limit
            )));
        }

        let records = db::achievements::load_records_for_artist(&self.db, artist).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let live = self.temporal.count_active_now(artist).await?;

        Ok(rank_rows(records, live, limit as usize))
    }
}

/// Score at achievement time; never above 100 since the clear was perfect
pub fn achieved_clear_rate(record: &AchievementRecord) -> f64 {
    if record.achieved_total <= 0 {
        return 0.0;
    }
    record.correct_count as f64 / record.achieved_total as f64 * 100.0
}

/// Score against today's catalog, capped at 100; 0 for an empty catalog
pub fn current_clear_rate(record: &AchievementRecord, live_count: i64) -> f64 {
    if live_count <= 0 {
        return 0.0;
    }
    (record.correct_count as f64 / live_count as f64 * 100.0).min(100.0)
}

fn compare(a: &(AchievementRecord, f64), b: &(AchievementRecord, f64)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| a.0.best_duration_ms.cmp(&b.0.best_duration_ms))
        .then_with(|| a.0.achieved_at.cmp(&b.0.achieved_at))
        .then_with(|| a.0.guid.cmp(&b.0.guid))
}

/// Sort records into display rows and keep the first `limit`
pub fn rank_rows(records: Vec<AchievementRecord>, live_count: i64, limit: usize) -> Vec<RankingRow> {
    let mut scored: Vec<(AchievementRecord, f64)> = records
        .into_iter()
        .map(|record| {
            let current = current_clear_rate(&record, live_count);
            (record, current)
        })
        .collect();
    scored.sort_by(compare);

    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, (record, current))| RankingRow {
            rank: index as u32 + 1,
            record_id: record.guid,
            player_id: record.player_id,
            difficulty: record.difficulty,
            achieved_clear_rate: achieved_clear_rate(&record),
            current_clear_rate: current,
            current_perfect: record.current_perfect,
            achieved_perfect: record.achieved_perfect,
            best_duration_ms: record.best_duration_ms,
            achieved_at: record.achieved_at,
        })
        .collect()
}
