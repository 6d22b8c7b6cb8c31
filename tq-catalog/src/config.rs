//! Runtime settings for tq-catalog
//!
//! Loaded once at startup from the `settings` table (seeded by
//! `tq_common::db::init_database`). Missing keys fall back to the same
//! defaults the seeding uses.

use chrono::Duration;
use sqlx::SqlitePool;
use tq_common::db::get_setting_or;
use tq_common::{Error, Result};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    /// History events older than this are purged (anchor events excepted)
    pub history_retention_days: i64,
    /// Non-perfect records are re-checked once their last check is this old
    pub reconciliation_stale_after_secs: i64,
    /// Advisory lease length for one reconciliation run
    pub reconciliation_lease_secs: i64,
    /// Upper bound on lock-contention retries per mutation
    pub db_max_lock_wait_ms: u64,
    /// Largest ranking page a caller may request
    pub ranking_max_limit: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            history_retention_days: 365,
            reconciliation_stale_after_secs: 604_800,
            reconciliation_lease_secs: 3_600,
            db_max_lock_wait_ms: 5_000,
            ranking_max_limit: 500,
        }
    }
}

impl CatalogSettings {
    pub async fn load(db: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            history_retention_days: get_setting_or(
                db,
                "history_retention_days",
                defaults.history_retention_days,
            )
            .await?,
            reconciliation_stale_after_secs: get_setting_or(
                db,
                "reconciliation_stale_after_secs",
                defaults.reconciliation_stale_after_secs,
            )
            .await?,
            reconciliation_lease_secs: get_setting_or(
                db,
                "reconciliation_lease_secs",
                defaults.reconciliation_lease_secs,
            )
            .await?,
            db_max_lock_wait_ms: get_setting_or(
                db,
                "db_max_lock_wait_ms",
                defaults.db_max_lock_wait_ms,
            )
            .await?,
            ranking_max_limit: get_setting_or(db, "ranking_max_limit", defaults.ranking_max_limit)
                .await?,
        };
        settings.validate()?;

        info!(
            retention_days = settings.history_retention_days,
            stale_after_secs = settings.reconciliation_stale_after_secs,
            lease_secs = settings.reconciliation_lease_secs,
            "Catalog settings loaded"
        );
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_retention_days <= 0 {
            return Err(Error::Config(
                "history_retention_days must be positive".to_string(),
            ));
        }
        if self.reconciliation_stale_after_secs <= 0 || self.reconciliation_lease_secs <= 0 {
            return Err(Error::Config(
                "reconciliation intervals must be positive".to_string(),
            ));
        }
        if self.ranking_max_limit == 0 {
            return Err(Error::Config("ranking_max_limit must be positive".to_string()));
        }
        Ok(())
    }

    pub fn retention_window(&self) -> Duration {
        Duration::days(self.history_retention_days)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.reconciliation_stale_after_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::seconds(self.reconciliation_lease_secs)
    }
}
