//! Temporal Query Engine
//!
//! Answers "how many items of artist A were active at instant T" from the
//! history log alone. The item table's `active` column is a cache and is never
//! consulted here, except by [`TemporalQueryEngine::audit_artist`] which
//! compares the two.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tq_common::{time, Error, Result, SharedClock};
use tracing::warn;
use uuid::Uuid;

use crate::db;
use crate::models::{HistoryAction, HistoryEvent};

#[derive(Clone)]
pub struct TemporalQueryEngine {
    db: SqlitePool,
    clock: SharedClock,
}

impl TemporalQueryEngine {
    pub fn new(db: SqlitePool, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Active items of `artist` at `at`, inclusive of events at exactly `at`
    ///
    /// Returns 0 when the artist has no history at or before `at`.
    pub async fn count_active_at(&self, artist: &str, at: DateTime<Utc>) -> Result<i64> {
        db::history::count_active_at(&self.db, artist, time::to_millis(at)).await
    }

    pub async fn count_active_now(&self, artist: &str) -> Result<i64> {
        self.count_active_at(artist, self.clock.now()).await
    }

    /// Ids of the items counted by [`Self::count_active_at`]
    pub async fn active_items_at(&self, artist: &str, at: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let latest = db::history::latest_actions_at(&self.db, artist, time::to_millis(at)).await?;
        Ok(latest
            .into_iter()
            .filter(|(_, action)| action.is_active())
            .map(|(item_id, _)| item_id)
            .collect())
    }

    /// Check one item's retained history against the alternation rule and
    /// against the cached active flag
    pub async fn verify_item_history(&self, item_id: Uuid) -> Result<()> {
        let item = db::catalog::load_item(&self.db, item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Catalog item not found: {}", item_id)))?;
        let events = db::history::load_item_history(&self.db, item_id).await?;

        let Some(last) = events.last() else {
            return Err(Error::IntegrityViolation(format!(
                "Catalog item {} has no history",
                item_id
            )));
        };

        // Retention may have removed the leading ADDED, but only at or before
        // the cutoff it recorded
        let purged_before: Option<i64> =
            tq_common::db::get_setting(&self.db, db::history::PURGED_BEFORE_KEY).await?;
        let leading_trimmed = match (events.first(), purged_before) {
            (Some(first), Some(cutoff_ms)) => {
                first.action != HistoryAction::Added
                    && time::to_millis(first.occurred_at) <= cutoff_ms
            }
            _ => false,
        };
        validate_sequence(&events, leading_trimmed)?;

        if last.action.is_active() != item.active {
            return Err(Error::IntegrityViolation(format!(
                "Catalog item {} cached active={} but latest event is {} (seq {})",
                item_id, item.active, last.action, last.seq
            )));
        }

        Ok(())
    }

    /// Items of `artist` whose cached flag disagrees with the log at "now"
    pub async fn audit_artist(&self, artist: &str) -> Result<Vec<Uuid>> {
        let now_ms = time::to_millis(self.clock.now());
        let items = db::catalog::list_items(&self.db, artist, true).await?;
        let latest: HashMap<Uuid, HistoryAction> =
            db::history::latest_actions_at(&self.db, artist, now_ms)
                .await?
                .into_iter()
                .collect();

        let mut mismatched = Vec::new();
        for item in items {
            let derived = latest.get(&item.guid).map(|a| a.is_active()).unwrap_or(false);
            if derived != item.active {
                warn!(
                    item_id = %item.guid,
                    artist,
                    cached = item.active,
                    derived,
                    "Catalog cache disagrees with history log"
                );
                mismatched.push(item.guid);
            }
        }

        Ok(mismatched)
    }
}

/// Check the ADDED, then DELETED / RESTORED alternation of one item's events
///
/// `leading_trimmed` accepts a history whose first retained event is not ADDED.
pub fn validate_sequence(events: &[HistoryEvent], leading_trimmed: bool) -> Result<()> {
    let mut previous: Option<&HistoryEvent> = None;

    for event in events {
        let valid = match (previous.map(|p| p.action), event.action) {
            (None, HistoryAction::Added) => true,
            (None, _) => leading_trimmed,
            (Some(HistoryAction::Added), HistoryAction::Deleted) => true,
            (Some(HistoryAction::Restored), HistoryAction::Deleted) => true,
            (Some(HistoryAction::Deleted), HistoryAction::Restored) => true,
            _ => false,
        };

        if !valid {
            return Err(Error::IntegrityViolation(format!(
                "Item {} has {} (seq {}) after {}",
                event.item_id,
                event.action,
                event.seq,
                previous
                    .map(|p| p.action.as_str())
                    .unwrap_or("start of history")
            )));
        }
        previous = Some(event);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use HistoryAction::{Added, Deleted, Restored};

    fn events(actions: &[HistoryAction]) -> Vec<HistoryEvent> {
        let item_id = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        actions
            .iter()
            .enumerate()
            .map(|(i, action)| HistoryEvent {
                seq: i as i64 + 1,
                item_id,
                artist: "Artist".to_string(),
                action: *action,
                occurred_at: t0 + chrono::Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_valid_alternation() {
        assert!(validate_sequence(&events(&[]), false).is_ok());
        assert!(validate_sequence(&events(&[Added]), false).is_ok());
        assert!(validate_sequence(&events(&[Added, Deleted, Restored, Deleted]), false).is_ok());
    }

    #[test]
    fn test_double_delete_rejected() {
        let result = validate_sequence(&events(&[Added, Deleted, Deleted]), false);
        assert!(matches!(result, Err(Error::IntegrityViolation(_))));
    }

    #[test]
    fn test_restore_without_delete_rejected() {
        let result = validate_sequence(&events(&[Added, Restored]), false);
        assert!(matches!(result, Err(Error::IntegrityViolation(_))));
    }

    #[test]
    fn test_second_added_rejected() {
        let result = validate_sequence(&events(&[Added, Deleted, Added]), false);
        assert!(matches!(result, Err(Error::IntegrityViolation(_))));
    }

    #[test]
    fn test_trimmed_history_may_start_mid_cycle() {
        assert!(validate_sequence(&events(&[Restored, Deleted]), true).is_ok());
        assert!(validate_sequence(&events(&[Restored, Deleted]), false).is_err());
        // Alternation still applies after the first retained event
        assert!(validate_sequence(&events(&[Deleted, Deleted]), true).is_err());
    }
}
