//! Achievement record persistence
//!
//! `achieved_total`, `correct_count` and `achieved_at_ms` are written once by
//! the insert and never appear in an UPDATE. `achieved_perfect` is only ever
//! lowered.

use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use tq_common::{time, Error, Result};
use uuid::Uuid;

use super::parse_guid;
use crate::models::{AchievementRecord, ClearOutcome, NewPerfectClear, RecordedClear};

const RECORD_COLUMNS: &str = "guid, player_id, artist, difficulty, achieved_total, correct_count, \
     achieved_at_ms, best_duration_ms, achieved_perfect, current_perfect, last_checked_at_ms";

fn record_from_row(row: &SqliteRow) -> Result<AchievementRecord> {
    let guid: String = row.try_get("guid")?;
    let player_id: String = row.try_get("player_id")?;
    let difficulty: String = row.try_get("difficulty")?;
    let last_checked: Option<i64> = row.try_get("last_checked_at_ms")?;

    Ok(AchievementRecord {
        guid: parse_guid("guid", &guid)?,
        player_id: parse_guid("player_id", &player_id)?,
        artist: row.try_get("artist")?,
        difficulty: difficulty
            .parse()
            .map_err(|e| Error::Internal(format!("Stored difficulty unreadable: {}", e)))?,
        achieved_total: row.try_get("achieved_total")?,
        correct_count: row.try_get("correct_count")?,
        achieved_at: time::from_millis(row.try_get("achieved_at_ms")?)?,
        best_duration_ms: row.try_get("best_duration_ms")?,
        achieved_perfect: row.try_get("achieved_perfect")?,
        current_perfect: row.try_get("current_perfect")?,
        last_checked_at: last_checked.map(time::from_millis).transpose()?,
    })
}

/// Create the record for a first qualifying clear, or lower its best duration
///
/// The insert is `ON CONFLICT DO NOTHING`, so two players racing on the same
/// key never fail: the loser falls through to the best-duration update.
pub async fn upsert_perfect_clear(
    conn: &mut SqliteConnection,
    clear: &NewPerfectClear,
    at_ms: i64,
) -> Result<RecordedClear> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO achievement_records (
            guid, player_id, artist, difficulty, achieved_total, correct_count,
            achieved_at_ms, best_duration_ms, achieved_perfect, current_perfect,
            last_checked_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 1, ?)
        ON CONFLICT(player_id, artist, difficulty) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(clear.player_id.to_string())
    .bind(&clear.artist)
    .bind(clear.difficulty.as_str())
    .bind(clear.achieved_total)
    .bind(clear.correct_count)
    .bind(at_ms)
    .bind(clear.duration_ms)
    .bind(at_ms)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let outcome = if inserted > 0 {
        ClearOutcome::Created
    } else {
        let improved = sqlx::query(
            r#"
            UPDATE achievement_records
            SET best_duration_ms = ?
            WHERE player_id = ? AND artist = ? AND difficulty = ? AND best_duration_ms > ?
            "#,
        )
        .bind(clear.duration_ms)
        .bind(clear.player_id.to_string())
        .bind(&clear.artist)
        .bind(clear.difficulty.as_str())
        .bind(clear.duration_ms)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if improved > 0 {
            ClearOutcome::Improved
        } else {
            ClearOutcome::Unchanged
        }
    };

    let sql = format!(
        "SELECT {} FROM achievement_records WHERE player_id = ? AND artist = ? AND difficulty = ?",
        RECORD_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(clear.player_id.to_string())
        .bind(&clear.artist)
        .bind(clear.difficulty.as_str())
        .fetch_one(&mut *conn)
        .await?;

    Ok(RecordedClear {
        outcome,
        record: record_from_row(&row)?,
    })
}

/// Load one record by id
pub async fn load_record<'e, E>(executor: E, record_id: Uuid) -> Result<Option<AchievementRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM achievement_records WHERE guid = ?", RECORD_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(record_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// All records of one artist, every difficulty
pub async fn load_records_for_artist(
    pool: &SqlitePool,
    artist: &str,
) -> Result<Vec<AchievementRecord>> {
    let sql = format!(
        "SELECT {} FROM achievement_records WHERE artist = ? ORDER BY achieved_at_ms, guid",
        RECORD_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(artist).fetch_all(pool).await?;

    rows.iter().map(record_from_row).collect()
}

/// Records the reconciliation batch must inspect
///
/// Currently-perfect records are always due; others once their last check is
/// at or before `stale_before_ms`, or they were never checked.
pub async fn load_records_due(
    pool: &SqlitePool,
    stale_before_ms: i64,
) -> Result<Vec<AchievementRecord>> {
    let sql = format!(
        r#"
        SELECT {} FROM achievement_records
        WHERE current_perfect = 1
           OR last_checked_at_ms IS NULL
           OR last_checked_at_ms <= ?
        ORDER BY artist, guid
        "#,
        RECORD_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(stale_before_ms).fetch_all(pool).await?;

    rows.iter().map(record_from_row).collect()
}

/// Stamp one record with the outcome of a reconciliation check
///
/// Single statement, so it is its own transaction. `achieved_perfect` can only
/// be lowered here (`MIN`), never re-granted.
pub async fn apply_check(
    pool: &SqlitePool,
    record_id: Uuid,
    current_perfect: bool,
    achieved_perfect: bool,
    checked_at_ms: i64,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE achievement_records
        SET current_perfect = ?,
            achieved_perfect = MIN(achieved_perfect, ?),
            last_checked_at_ms = ?
        WHERE guid = ?
        "#,
    )
    .bind(current_perfect)
    .bind(achieved_perfect)
    .bind(checked_at_ms)
    .bind(record_id.to_string())
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!(
            "Achievement record not found: {}",
            record_id
        )));
    }

    Ok(())
}
