//! History log persistence and point-in-time queries
//!
//! An item's state at instant T is the action of its latest event with
//! `occurred_at_ms <= T`, ties broken by `seq`. All queries here go through the
//! `(artist, occurred_at_ms)` index and never error on an empty history.

use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use tq_common::{time, Result};
use uuid::Uuid;

use super::parse_guid;
use crate::models::{HistoryAction, HistoryEvent};

/// Latest event per item of one artist at or before a bound (inclusive)
const LATEST_PER_ITEM: &str = r#"
    SELECT item_id, action FROM (
        SELECT item_id, action,
               ROW_NUMBER() OVER (
                   PARTITION BY item_id
                   ORDER BY occurred_at_ms DESC, seq DESC
               ) AS rn
        FROM item_history
        WHERE artist = ? AND occurred_at_ms <= ?
    )
    WHERE rn = 1
"#;

fn event_from_row(row: &SqliteRow) -> Result<HistoryEvent> {
    let item_id: String = row.try_get("item_id")?;
    let action: String = row.try_get("action")?;
    Ok(HistoryEvent {
        seq: row.try_get("seq")?,
        item_id: parse_guid("item_id", &item_id)?,
        artist: row.try_get("artist")?,
        action: action.parse()?,
        occurred_at: time::from_millis(row.try_get("occurred_at_ms")?)?,
    })
}

/// Append one event; must run inside the caller's mutation transaction
pub async fn append_event(
    conn: &mut SqliteConnection,
    item_id: Uuid,
    artist: &str,
    action: HistoryAction,
    at_ms: i64,
) -> Result<i64> {
    let seq = sqlx::query(
        "INSERT INTO item_history (item_id, artist, action, occurred_at_ms) VALUES (?, ?, ?, ?)",
    )
    .bind(item_id.to_string())
    .bind(artist)
    .bind(action.as_str())
    .bind(at_ms)
    .execute(conn)
    .await?
    .last_insert_rowid();

    tracing::debug!(
        seq,
        item_id = %item_id,
        artist,
        action = %action,
        occurred_at_ms = at_ms,
        "Appended history event"
    );

    Ok(seq)
}

/// Number of items of `artist` active at `at_ms` (inclusive)
pub async fn count_active_at<'e, E>(executor: E, artist: &str, at_ms: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT COUNT(*) FROM ({}) WHERE action IN ('ADDED', 'RESTORED')",
        LATEST_PER_ITEM
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(artist)
        .bind(at_ms)
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// Latest action per item of `artist` at `at_ms`, ordered by item id
pub async fn latest_actions_at<'e, E>(
    executor: E,
    artist: &str,
    at_ms: i64,
) -> Result<Vec<(Uuid, HistoryAction)>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} ORDER BY item_id", LATEST_PER_ITEM);
    let rows: Vec<(String, String)> = sqlx::query_as(&sql)
        .bind(artist)
        .bind(at_ms)
        .fetch_all(executor)
        .await?;

    rows.into_iter()
        .map(|(item_id, action)| Ok((parse_guid("item_id", &item_id)?, action.parse()?)))
        .collect()
}

/// Every retained event of one item in log order
pub async fn load_item_history<'e, E>(executor: E, item_id: Uuid) -> Result<Vec<HistoryEvent>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT seq, item_id, artist, action, occurred_at_ms
        FROM item_history
        WHERE item_id = ?
        ORDER BY occurred_at_ms, seq
        "#,
    )
    .bind(item_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// Settings key holding the highest cutoff any purge has used
pub const PURGED_BEFORE_KEY: &str = "history_purged_before_ms";

/// Delete events strictly older than `cutoff_ms`, keeping each item's anchor
///
/// The anchor is the item's latest event at or before the cutoff. It alone
/// determines the item's state for every instant from the cutoff until the
/// next event, so it survives regardless of age. The cutoff is recorded under
/// [`PURGED_BEFORE_KEY`] in the same transaction.
pub async fn purge_before(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        r#"
        DELETE FROM item_history
        WHERE occurred_at_ms < ?
          AND seq NOT IN (
              SELECT seq FROM (
                  SELECT seq,
                         ROW_NUMBER() OVER (
                             PARTITION BY item_id
                             ORDER BY occurred_at_ms DESC, seq DESC
                         ) AS rn
                  FROM item_history
                  WHERE occurred_at_ms <= ?
              )
              WHERE rn = 1
          )
        "#,
    )
    .bind(cutoff_ms)
    .bind(cutoff_ms)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = CAST(MAX(COALESCE(CAST(settings.value AS INTEGER), 0), CAST(excluded.value AS INTEGER)) AS TEXT),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(PURGED_BEFORE_KEY)
    .bind(cutoff_ms.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{insert_item, set_item_active};
    use crate::db::test_support::test_pool;

    #[tokio::test]
    async fn test_count_with_no_history_is_zero() {
        let (_dir, pool) = test_pool().await;
        assert_eq!(count_active_at(&pool, "Nobody", i64::MAX).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_is_inclusive_of_bound() {
        let (_dir, pool) = test_pool().await;
        let item = insert_item(&pool, "Artist", "Song", 1_000).await.unwrap();
        set_item_active(&pool, item.guid, false, 2_000).await.unwrap();

        assert_eq!(count_active_at(&pool, "Artist", 999).await.unwrap(), 0);
        assert_eq!(count_active_at(&pool, "Artist", 1_000).await.unwrap(), 1);
        assert_eq!(count_active_at(&pool, "Artist", 1_999).await.unwrap(), 1);
        assert_eq!(count_active_at(&pool, "Artist", 2_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_millisecond_events_ordered_by_seq() {
        let (_dir, pool) = test_pool().await;
        let item = insert_item(&pool, "Artist", "Song", 1_000).await.unwrap();
        set_item_active(&pool, item.guid, false, 1_000).await.unwrap();

        // DELETED was appended after ADDED in the same millisecond
        assert_eq!(count_active_at(&pool, "Artist", 1_000).await.unwrap(), 0);

        let actions = latest_actions_at(&pool, "Artist", 1_000).await.unwrap();
        assert_eq!(actions, vec![(item.guid, HistoryAction::Deleted)]);
    }

    #[tokio::test]
    async fn test_load_item_history_in_order() {
        let (_dir, pool) = test_pool().await;
        let item = insert_item(&pool, "Artist", "Song", 1_000).await.unwrap();
        set_item_active(&pool, item.guid, false, 2_000).await.unwrap();
        set_item_active(&pool, item.guid, true, 3_000).await.unwrap();

        let events = load_item_history(&pool, item.guid).await.unwrap();
        let actions: Vec<_> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![HistoryAction::Added, HistoryAction::Deleted, HistoryAction::Restored]
        );
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[tokio::test]
    async fn test_purge_keeps_anchor_and_newer_events() {
        let (_dir, pool) = test_pool().await;
        let item = insert_item(&pool, "Artist", "Song", 1_000).await.unwrap();
        set_item_active(&pool, item.guid, false, 2_000).await.unwrap();
        set_item_active(&pool, item.guid, true, 3_000).await.unwrap();
        set_item_active(&pool, item.guid, false, 9_000).await.unwrap();

        // ADDED and DELETED@2000 are superseded by the RESTORED@3000 anchor
        let removed = purge_before(&pool, 5_000).await.unwrap();
        assert_eq!(removed, 2);

        let events = load_item_history(&pool, item.guid).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, HistoryAction::Restored);

        // Inside the window the answers are unchanged
        assert_eq!(count_active_at(&pool, "Artist", 5_000).await.unwrap(), 1);
        assert_eq!(count_active_at(&pool, "Artist", 9_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_event_exactly_at_cutoff() {
        let (_dir, pool) = test_pool().await;
        let item = insert_item(&pool, "Artist", "Song", 1_000).await.unwrap();
        set_item_active(&pool, item.guid, false, 5_000).await.unwrap();

        let removed = purge_before(&pool, 5_000).await.unwrap();
        // ADDED is superseded by the DELETED sitting on the cutoff
        assert_eq!(removed, 1);

        let events = load_item_history(&pool, item.guid).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(time::to_millis(events[0].occurred_at), 5_000);
    }

    #[tokio::test]
    async fn test_purge_records_highest_cutoff() {
        let (_dir, pool) = test_pool().await;
        purge_before(&pool, 5_000).await.unwrap();
        purge_before(&pool, 3_000).await.unwrap();

        let recorded: Option<i64> = tq_common::db::get_setting(&pool, PURGED_BEFORE_KEY)
            .await
            .unwrap();
        assert_eq!(recorded, Some(5_000));
    }
}
