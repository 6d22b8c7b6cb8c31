//! Achievement Record Store
//!
//! Records perfect clears keyed by (player, artist, difficulty). A repeat
//! clear never touches the original snapshot; it can only lower the best
//! duration.

use sqlx::SqlitePool;
use tq_common::{time, Error, Result, SharedClock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db;
use crate::models::{AchievementRecord, ClearOutcome, NewPerfectClear, RecordedClear};

#[derive(Clone)]
pub struct AchievementStore {
    db: SqlitePool,
    clock: SharedClock,
}

impl AchievementStore {
    pub fn new(db: SqlitePool, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Record a qualifying perfect clear
    ///
    /// Rejects anything that is not a perfect score over a non-empty catalog.
    pub async fn record_perfect_clear(&self, clear: NewPerfectClear) -> Result<RecordedClear> {
        validate_clear(&clear)?;

        let mut conn = self.db.acquire().await?;
        let at_ms = time::to_millis(self.clock.now());
        let recorded = db::achievements::upsert_perfect_clear(&mut conn, &clear, at_ms).await?;
        log_recorded(&recorded);

        Ok(recorded)
    }

    pub async fn get_record(&self, record_id: Uuid) -> Result<AchievementRecord> {
        db::achievements::load_record(&self.db, record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Achievement record not found: {}", record_id)))
    }

    pub async fn records_for_artist(&self, artist: &str) -> Result<Vec<AchievementRecord>> {
        db::achievements::load_records_for_artist(&self.db, artist).await
    }
}

pub(crate) fn validate_clear(clear: &NewPerfectClear) -> Result<()> {
    if clear.artist.trim().is_empty() {
        return Err(Error::Validation("artist must not be blank".to_string()));
    }
    if clear.achieved_total <= 0 {
        return Err(Error::Validation(format!(
            "A perfect clear needs at least one item, got {}",
            clear.achieved_total
        )));
    }
    if clear.correct_count != clear.achieved_total {
        return Err(Error::Validation(format!(
            "Not a perfect clear: {}/{} correct",
            clear.correct_count, clear.achieved_total
        )));
    }
    if clear.duration_ms < 0 {
        return Err(Error::Validation("duration_ms must not be negative".to_string()));
    }
    Ok(())
}

pub(crate) fn log_recorded(recorded: &RecordedClear) {
    let record = &recorded.record;
    match recorded.outcome {
        ClearOutcome::Created => info!(
            record_id = %record.guid,
            player_id = %record.player_id,
            artist = %record.artist,
            difficulty = record.difficulty.as_str(),
            achieved_total = record.achieved_total,
            "Perfect clear recorded"
        ),
        ClearOutcome::Improved => info!(
            record_id = %record.guid,
            best_duration_ms = record.best_duration_ms,
            "Perfect clear best duration improved"
        ),
        ClearOutcome::Unchanged => debug!(
            record_id = %record.guid,
            "Repeat perfect clear left record unchanged"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::models::{AchievementState, Difficulty};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tq_common::ManualClock;

    fn clear(player_id: Uuid, total: i64, correct: i64, duration_ms: i64) -> NewPerfectClear {
        NewPerfectClear {
            player_id,
            artist: "Artist".to_string(),
            difficulty: Difficulty::Hard,
            achieved_total: total,
            correct_count: correct,
            duration_ms,
        }
    }

    #[tokio::test]
    async fn test_rejects_non_perfect_and_empty() {
        let (_dir, pool) = test_pool().await;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let store = AchievementStore::new(pool, Arc::new(clock));
        let player = Uuid::new_v4();

        for bad in [
            clear(player, 10, 9, 1_000),
            clear(player, 0, 0, 1_000),
            clear(player, 5, 5, -1),
        ] {
            assert!(matches!(
                store.record_perfect_clear(bad).await,
                Err(Error::Validation(_))
            ));
        }
        assert!(store.records_for_artist("Artist").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_clear_keeps_snapshot() {
        let (_dir, pool) = test_pool().await;
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let store = AchievementStore::new(pool, Arc::new(clock.clone()));
        let player = Uuid::new_v4();

        let first = store.record_perfect_clear(clear(player, 10, 10, 50_000)).await.unwrap();
        assert_eq!(first.outcome, ClearOutcome::Created);
        assert_eq!(first.record.state(), AchievementState::Achieved);
        assert_eq!(first.record.achieved_at, t0);

        // Catalog grew to 12 in the meantime; snapshot must stay at 10
        clock.advance(Duration::days(3));
        let second = store.record_perfect_clear(clear(player, 12, 12, 40_000)).await.unwrap();
        assert_eq!(second.outcome, ClearOutcome::Improved);
        assert_eq!(second.record.guid, first.record.guid);
        assert_eq!(second.record.achieved_total, 10);
        assert_eq!(second.record.achieved_at, t0);
        assert_eq!(second.record.best_duration_ms, 40_000);

        let third = store.record_perfect_clear(clear(player, 12, 12, 45_000)).await.unwrap();
        assert_eq!(third.outcome, ClearOutcome::Unchanged);
        assert_eq!(third.record.best_duration_ms, 40_000);

        let loaded = store.get_record(first.record.guid).await.unwrap();
        assert_eq!(loaded, third.record);
        assert!(matches!(
            store.get_record(Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }
}
