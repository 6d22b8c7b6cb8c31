//! Catalog item persistence
//!
//! Every state change writes the item row and its history event in the same
//! transaction. The conditional `version` update turns a lost race into
//! `ConcurrencyConflict` instead of a double-applied mutation.

use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite, SqlitePool};
use tq_common::{time, Error, Result};
use uuid::Uuid;

use super::{history, parse_guid};
use crate::models::{CatalogItem, HistoryAction, MutationOutcome};

fn item_from_row(row: &SqliteRow) -> Result<CatalogItem> {
    let guid: String = row.try_get("guid")?;
    Ok(CatalogItem {
        guid: parse_guid("guid", &guid)?,
        artist: row.try_get("artist")?,
        title: row.try_get("title")?,
        active: row.try_get("active")?,
        version: row.try_get("version")?,
        created_at: time::from_millis(row.try_get("created_at_ms")?)?,
        updated_at: time::from_millis(row.try_get("updated_at_ms")?)?,
    })
}

/// Insert a new active item and its ADDED event
pub async fn insert_item(
    pool: &SqlitePool,
    artist: &str,
    title: &str,
    at_ms: i64,
) -> Result<CatalogItem> {
    let guid = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO catalog_items (guid, artist, title, active, version, created_at_ms, updated_at_ms)
        VALUES (?, ?, ?, 1, 0, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(artist)
    .bind(title)
    .bind(at_ms)
    .bind(at_ms)
    .execute(&mut *tx)
    .await?;

    history::append_event(&mut tx, guid, artist, HistoryAction::Added, at_ms).await?;

    tx.commit().await?;

    Ok(CatalogItem {
        guid,
        artist: artist.to_string(),
        title: title.to_string(),
        active: true,
        version: 0,
        created_at: time::from_millis(at_ms)?,
        updated_at: time::from_millis(at_ms)?,
    })
}

/// Flip an item's active flag and append DELETED / RESTORED
///
/// Already in the requested state: returns `Unchanged` and writes nothing.
/// The event is never dated before the item's previous change, so a writer
/// whose clock lags keeps the log in time order.
pub async fn set_item_active(
    pool: &SqlitePool,
    item_id: Uuid,
    active: bool,
    at_ms: i64,
) -> Result<MutationOutcome> {
    let mut tx = pool.begin().await?;

    let row: Option<(String, bool, i64, i64)> = sqlx::query_as(
        "SELECT artist, active, version, updated_at_ms FROM catalog_items WHERE guid = ?",
    )
    .bind(item_id.to_string())
    .fetch_optional(&mut *tx)
    .await?;

    let (artist, current, version, last_changed_ms) =
        row.ok_or_else(|| Error::NotFound(format!("Catalog item not found: {}", item_id)))?;

    if current == active {
        // Dropping the transaction rolls back the read
        return Ok(MutationOutcome::Unchanged);
    }

    // updated_at_ms always carries the item's latest event time
    let at_ms = at_ms.max(last_changed_ms);

    let updated = sqlx::query(
        r#"
        UPDATE catalog_items
        SET active = ?, version = version + 1, updated_at_ms = ?
        WHERE guid = ? AND version = ?
        "#,
    )
    .bind(active)
    .bind(at_ms)
    .bind(item_id.to_string())
    .bind(version)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::ConcurrencyConflict(format!(
            "Catalog item {} was modified concurrently (expected version {})",
            item_id, version
        )));
    }

    let action = if active {
        HistoryAction::Restored
    } else {
        HistoryAction::Deleted
    };
    history::append_event(&mut tx, item_id, &artist, action, at_ms).await?;

    tx.commit().await?;

    Ok(MutationOutcome::Applied)
}

/// Load one item by id
pub async fn load_item<'e, E>(executor: E, item_id: Uuid) -> Result<Option<CatalogItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT guid, artist, title, active, version, created_at_ms, updated_at_ms
        FROM catalog_items
        WHERE guid = ?
        "#,
    )
    .bind(item_id.to_string())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(item_from_row).transpose()
}

/// List an artist's items, oldest first
pub async fn list_items(
    pool: &SqlitePool,
    artist: &str,
    include_inactive: bool,
) -> Result<Vec<CatalogItem>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, artist, title, active, version, created_at_ms, updated_at_ms
        FROM catalog_items
        WHERE artist = ? AND (active = 1 OR ?)
        ORDER BY created_at_ms, guid
        "#,
    )
    .bind(artist)
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

/// Ids of items whose cached flag says active
pub async fn active_item_ids<'e, E>(executor: E, artist: &str) -> Result<Vec<Uuid>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT guid FROM catalog_items WHERE artist = ? AND active = 1 ORDER BY guid",
    )
    .bind(artist)
    .fetch_all(executor)
    .await?;

    ids.iter().map(|id| parse_guid("guid", id)).collect()
}
