//! History retention cleanup
//!
//! Purges history events strictly older than `now - window`. Each item keeps
//! its anchor (latest event at or before the cutoff), so point-in-time answers
//! for any instant inside the window are unchanged. Items are never removed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tq_common::{time, Result, SharedClock};
use tracing::{info, warn};

use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub removed: u64,
    pub cutoff: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RetentionCleaner {
    db: SqlitePool,
    clock: SharedClock,
    window: Duration,
}

impl RetentionCleaner {
    pub fn new(db: SqlitePool, clock: SharedClock, window: Duration) -> Self {
        Self { db, clock, window }
    }

    /// Oldest instant still inside the retention window
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.window
    }

    pub async fn run(&self) -> Result<RetentionReport> {
        let cutoff = self.cutoff();

        match db::history::purge_before(&self.db, time::to_millis(cutoff)).await {
            Ok(removed) => {
                info!(removed, cutoff = %cutoff, "History retention cleanup finished");
                Ok(RetentionReport { removed, cutoff })
            }
            Err(e) => {
                warn!(cutoff = %cutoff, error = %e, "History retention cleanup failed");
                Err(e)
            }
        }
    }
}
