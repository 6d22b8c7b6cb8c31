//! Catalog Item Store & Mutation API
//!
//! Add / SoftDelete / Restore each run as one transaction that writes the item
//! row and appends its history event. Lock contention is retried; a lost
//! optimistic-version race is surfaced as `ConcurrencyConflict`.

use sqlx::SqlitePool;
use tq_common::{time, Error, Result, SharedClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db;
use crate::models::{CatalogItem, HistoryEvent, MutationOutcome};
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct CatalogStore {
    db: SqlitePool,
    clock: SharedClock,
    max_lock_wait_ms: u64,
}

impl CatalogStore {
    pub fn new(db: SqlitePool, clock: SharedClock, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            clock,
            max_lock_wait_ms,
        }
    }

    /// Add a new active item; returns the stored item
    pub async fn add_item(&self, artist: &str, title: &str) -> Result<CatalogItem> {
        let artist = required("artist", artist)?;
        let title = required("title", title)?;

        let result = retry_on_lock("add_item", self.max_lock_wait_ms, || async move {
            let at_ms = time::to_millis(self.clock.now());
            db::catalog::insert_item(&self.db, artist, title, at_ms).await
        })
        .await;

        match &result {
            Ok(item) => info!(item_id = %item.guid, artist, title, "Catalog item added"),
            Err(e) => warn!(artist, title, error = %e, "Catalog add failed"),
        }
        result
    }

    /// Soft-delete an item; no-op if it is already inactive
    pub async fn soft_delete(&self, item_id: Uuid) -> Result<MutationOutcome> {
        self.set_active(item_id, false, "soft_delete").await
    }

    /// Reactivate a soft-deleted item; no-op if it is already active
    pub async fn restore(&self, item_id: Uuid) -> Result<MutationOutcome> {
        self.set_active(item_id, true, "restore").await
    }

    async fn set_active(
        &self,
        item_id: Uuid,
        active: bool,
        operation: &str,
    ) -> Result<MutationOutcome> {
        let result = retry_on_lock(operation, self.max_lock_wait_ms, || async move {
            let at_ms = time::to_millis(self.clock.now());
            db::catalog::set_item_active(&self.db, item_id, active, at_ms).await
        })
        .await;

        match &result {
            Ok(MutationOutcome::Applied) => {
                info!(item_id = %item_id, operation, "Catalog item state changed")
            }
            Ok(MutationOutcome::Unchanged) => {
                debug!(item_id = %item_id, operation, "Catalog item already in requested state")
            }
            Err(e) => warn!(item_id = %item_id, operation, error = %e, "Catalog mutation failed"),
        }
        result
    }

    pub async fn get_item(&self, item_id: Uuid) -> Result<CatalogItem> {
        db::catalog::load_item(&self.db, item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Catalog item not found: {}", item_id)))
    }

    pub async fn list_items(&self, artist: &str, include_inactive: bool) -> Result<Vec<CatalogItem>> {
        db::catalog::list_items(&self.db, artist, include_inactive).await
    }

    /// Retained history of one item, oldest first
    pub async fn item_history(&self, item_id: Uuid) -> Result<Vec<HistoryEvent>> {
        // Distinguish "unknown item" from "history aged out"
        self.get_item(item_id).await?;
        db::history::load_item_history(&self.db, item_id).await
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} must not be blank", field)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::models::HistoryAction;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tq_common::ManualClock;

    #[tokio::test]
    async fn test_add_trims_and_validates() {
        let (_dir, pool) = test_pool().await;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let store = CatalogStore::new(pool, Arc::new(clock), 1_000);

        let item = store.add_item("  Artist ", " Song ").await.unwrap();
        assert_eq!(item.artist, "Artist");
        assert_eq!(item.title, "Song");

        let blank = store.add_item("   ", "Song").await;
        assert!(matches!(blank, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_restore_cycle_history() {
        let (_dir, pool) = test_pool().await;
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let store = CatalogStore::new(pool, Arc::new(clock.clone()), 1_000);

        let item = store.add_item("Artist", "Song").await.unwrap();
        clock.advance(Duration::seconds(1));
        assert_eq!(store.soft_delete(item.guid).await.unwrap(), MutationOutcome::Applied);
        clock.advance(Duration::seconds(1));
        assert_eq!(store.soft_delete(item.guid).await.unwrap(), MutationOutcome::Unchanged);
        assert_eq!(store.restore(item.guid).await.unwrap(), MutationOutcome::Applied);
        assert_eq!(store.restore(item.guid).await.unwrap(), MutationOutcome::Unchanged);

        let history = store.item_history(item.guid).await.unwrap();
        let actions: Vec<_> = history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![HistoryAction::Added, HistoryAction::Deleted, HistoryAction::Restored]
        );
        assert_eq!(history[1].occurred_at, t0 + Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_lagging_clock_keeps_history_in_order() {
        let (_dir, pool) = test_pool().await;
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(t0 + Duration::seconds(10));
        let shared: tq_common::SharedClock = Arc::new(clock.clone());
        let store = CatalogStore::new(pool.clone(), shared.clone(), 1_000);
        let temporal = crate::services::TemporalQueryEngine::new(pool, shared);

        let item = store.add_item("Artist", "Song").await.unwrap();
        clock.set(t0 + Duration::seconds(5));
        assert_eq!(store.soft_delete(item.guid).await.unwrap(), MutationOutcome::Applied);

        let history = store.item_history(item.guid).await.unwrap();
        assert_eq!(history[1].action, HistoryAction::Deleted);
        assert_eq!(history[1].occurred_at, t0 + Duration::seconds(10));

        let later = t0 + Duration::seconds(20);
        assert_eq!(temporal.count_active_at("Artist", later).await.unwrap(), 0);
        temporal.verify_item_history(item.guid).await.unwrap();
        assert!(temporal.audit_artist("Artist").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_item_operations() {
        let (_dir, pool) = test_pool().await;
        let store = CatalogStore::new(pool, Arc::new(tq_common::SystemClock), 1_000);
        let missing = Uuid::new_v4();

        assert!(matches!(store.soft_delete(missing).await, Err(Error::NotFound(_))));
        assert!(matches!(store.restore(missing).await, Err(Error::NotFound(_))));
        assert!(matches!(store.item_history(missing).await, Err(Error::NotFound(_))));
    }
}
