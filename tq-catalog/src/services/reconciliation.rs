//! Reconciliation Batch
//!
//! Re-derives `current_perfect` for every due achievement record from the
//! artist's live active count. Each record update is its own statement, and a
//! failure on one record is counted and skipped.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tq_common::{time, Error, Result, SharedClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TemporalQueryEngine;
use crate::db;
use crate::models::{AchievementRecord, ReconciliationReport};

const LEASE_NAME: &str = "reconciliation";

/// Flags a record should carry given the live active count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub current_perfect: bool,
    pub achieved_perfect: bool,
}

/// Apply the validity rule to one record
///
/// `current_perfect` holds only while the live count equals the snapshot.
/// `achieved_perfect` is revoked once the artist has no active items and is
/// never re-granted.
pub fn evaluate(record: &AchievementRecord, live_count: i64) -> Evaluation {
    let achieved_perfect = record.achieved_perfect && live_count > 0;
    Evaluation {
        current_perfect: achieved_perfect && live_count == record.achieved_total,
        achieved_perfect,
    }
}

#[derive(Clone)]
pub struct ReconciliationBatch {
    db: SqlitePool,
    clock: SharedClock,
    temporal: TemporalQueryEngine,
    stale_after: Duration,
    lease_ttl: Duration,
    holder: String,
}

impl ReconciliationBatch {
    pub fn new(
        db: SqlitePool,
        clock: SharedClock,
        temporal: TemporalQueryEngine,
        stale_after: Duration,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            db,
            clock,
            temporal,
            stale_after,
            lease_ttl,
            holder: format!("tq-catalog-{}", Uuid::new_v4()),
        }
    }

    /// Lease holder prefix; each run appends its own id
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Run one reconciliation pass
    ///
    /// Fails with `ConcurrencyConflict` without touching any record when
    /// another run, on this instance or elsewhere, owns the lease.
    pub async fn execute(&self) -> Result<ReconciliationReport> {
        let now = self.clock.now();
        let run_holder = format!("{}:{}", self.holder, Uuid::new_v4());
        let acquired = db::leases::try_acquire(
            &self.db,
            LEASE_NAME,
            &run_holder,
            time::to_millis(now),
            time::to_millis(now + self.lease_ttl),
        )
        .await?;

        if !acquired {
            warn!(holder = %run_holder, "Reconciliation already running");
            return Err(Error::ConcurrencyConflict(
                "Reconciliation lease held by another run".to_string(),
            ));
        }

        let result = self.run_pass(now).await;

        if let Err(e) = db::leases::release(&self.db, LEASE_NAME, &run_holder).await {
            // Expiry frees it eventually
            warn!(holder = %run_holder, error = %e, "Failed to release reconciliation lease");
        }

        match &result {
            Ok(report) => info!(
                processed = report.processed_count,
                invalidated = report.invalidated_count,
                revalidated = report.revalidated_count,
                retired = report.retired_count,
                failed = report.failed_count,
                artists = report.artist_count,
                "Reconciliation finished"
            ),
            Err(e) => warn!(error = %e, "Reconciliation aborted"),
        }
        result
    }

    /// Every record of one run is stamped with the run's start instant, so a
    /// run exactly one stale window later finds it due again.
    async fn run_pass(&self, now: DateTime<Utc>) -> Result<ReconciliationReport> {
        let checked_at_ms = time::to_millis(now);
        let stale_before_ms = time::to_millis(now - self.stale_after);
        let records = db::achievements::load_records_due(&self.db, stale_before_ms).await?;
        debug!(due = records.len(), "Reconciliation records loaded");

        // None marks an artist whose count failed this run
        let mut live_counts: HashMap<String, Option<i64>> = HashMap::new();
        let mut report = ReconciliationReport::default();

        for record in &records {
            let live = match live_counts.get(&record.artist) {
                Some(count) => *count,
                None => {
                    let count = match self.temporal.count_active_at(&record.artist, now).await {
                        Ok(count) => Some(count),
                        Err(e) => {
                            warn!(artist = %record.artist, error = %e,
                                "Live count failed, skipping artist's records");
                            None
                        }
                    };
                    live_counts.insert(record.artist.clone(), count);
                    count
                }
            };

            let Some(live) = live else {
                report.failed_count += 1;
                continue;
            };

            let evaluation = evaluate(record, live);

            if let Err(e) = db::achievements::apply_check(
                &self.db,
                record.guid,
                evaluation.current_perfect,
                evaluation.achieved_perfect,
                checked_at_ms,
            )
            .await
            {
                warn!(record_id = %record.guid, artist = %record.artist, error = %e,
                    "Reconciliation update failed, skipping record");
                report.failed_count += 1;
                continue;
            }

            report.processed_count += 1;
            if record.current_perfect && !evaluation.current_perfect {
                report.invalidated_count += 1;
            }
            if !record.current_perfect && evaluation.current_perfect {
                report.revalidated_count += 1;
            }
            if record.achieved_perfect && !evaluation.achieved_perfect {
                report.retired_count += 1;
                info!(record_id = %record.guid, artist = %record.artist, "Achievement retired");
            }
        }

        report.artist_count = live_counts.values().filter(|c| c.is_some()).count() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::models::{Difficulty, NewPerfectClear};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tq_common::ManualClock;

    fn record(achieved_total: i64, achieved: bool, current: bool) -> AchievementRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        AchievementRecord {
            guid: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            artist: "Artist".to_string(),
            difficulty: Difficulty::Easy,
            achieved_total,
            correct_count: achieved_total,
            achieved_at: at,
            best_duration_ms: 1_000,
            achieved_perfect: achieved,
            current_perfect: current,
            last_checked_at: Some(at),
        }
    }

    #[test]
    fn test_evaluate_matches_validity_rule() {
        let r = record(10, true, true);
        assert_eq!(
            evaluate(&r, 10),
            Evaluation { current_perfect: true, achieved_perfect: true }
        );
        assert_eq!(
            evaluate(&r, 11),
            Evaluation { current_perfect: false, achieved_perfect: true }
        );
        assert_eq!(
            evaluate(&r, 9),
            Evaluation { current_perfect: false, achieved_perfect: true }
        );
        assert_eq!(
            evaluate(&r, 0),
            Evaluation { current_perfect: false, achieved_perfect: false }
        );
    }

    #[test]
    fn test_evaluate_never_regrants_retired() {
        let retired = record(10, false, false);
        assert_eq!(
            evaluate(&retired, 10),
            Evaluation { current_perfect: false, achieved_perfect: false }
        );
    }

    #[tokio::test]
    async fn test_lease_held_elsewhere_is_conflict() {
        let (_dir, pool) = test_pool().await;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock: SharedClock = Arc::new(ManualClock::new(now));
        let temporal = TemporalQueryEngine::new(pool.clone(), clock.clone());
        let batch = ReconciliationBatch::new(
            pool.clone(),
            clock,
            temporal,
            Duration::days(7),
            Duration::hours(1),
        );

        let other = db::leases::try_acquire(
            &pool,
            LEASE_NAME,
            "other-node",
            time::to_millis(now),
            time::to_millis(now + Duration::minutes(5)),
        )
        .await
        .unwrap();
        assert!(other);

        assert!(matches!(
            batch.execute().await,
            Err(Error::ConcurrencyConflict(_))
        ));

        db::leases::release(&pool, LEASE_NAME, "other-node").await.unwrap();
        let report = batch.execute().await.unwrap();
        assert_eq!(report, ReconciliationReport::default());

        // Lease released after the run
        assert!(db::leases::try_acquire(
            &pool,
            LEASE_NAME,
            "other-node",
            time::to_millis(now),
            time::to_millis(now + Duration::minutes(5)),
        )
        .await
        .unwrap());
    }

    fn batch_at(pool: &SqlitePool, now: DateTime<Utc>) -> ReconciliationBatch {
        let clock: SharedClock = Arc::new(ManualClock::new(now));
        let temporal = TemporalQueryEngine::new(pool.clone(), clock.clone());
        ReconciliationBatch::new(
            pool.clone(),
            clock,
            temporal,
            Duration::days(7),
            Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn test_overlapping_run_on_same_instance_is_conflict() {
        let (_dir, pool) = test_pool().await;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let batch = batch_at(&pool, now);

        // Another run of this same instance is in flight
        let in_flight = format!("{}:{}", batch.holder(), Uuid::new_v4());
        assert!(db::leases::try_acquire(
            &pool,
            LEASE_NAME,
            &in_flight,
            time::to_millis(now),
            time::to_millis(now + Duration::minutes(5)),
        )
        .await
        .unwrap());

        assert!(matches!(
            batch.execute().await,
            Err(Error::ConcurrencyConflict(_))
        ));

        // The rejected run must not have released the in-flight lease
        assert!(!db::leases::try_acquire(
            &pool,
            LEASE_NAME,
            "other-node",
            time::to_millis(now),
            time::to_millis(now + Duration::minutes(5)),
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn test_failed_live_count_skips_artist_without_aborting() {
        let (_dir, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut ids = Vec::new();
        for artist in ["First", "Second"] {
            let clear = NewPerfectClear {
                player_id: Uuid::new_v4(),
                artist: artist.to_string(),
                difficulty: Difficulty::Normal,
                achieved_total: 3,
                correct_count: 3,
                duration_ms: 1_000,
            };
            let recorded = db::achievements::upsert_perfect_clear(&mut conn, &clear, 1_000)
                .await
                .unwrap();
            ids.push(recorded.record.guid);
        }
        drop(conn);

        // Every live count now fails
        sqlx::query("DROP TABLE item_history").execute(&pool).await.unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = batch_at(&pool, now).execute().await.unwrap();
        assert_eq!(report.failed_count, 2);
        assert_eq!(report.processed_count, 0);
        assert_eq!(report.artist_count, 0);

        for id in ids {
            let record = db::achievements::load_record(&pool, id).await.unwrap().unwrap();
            assert!(record.current_perfect);
            assert_eq!(record.last_checked_at.map(time::to_millis), Some(1_000));
        }
    }
}
