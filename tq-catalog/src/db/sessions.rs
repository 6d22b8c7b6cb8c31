//! Game session persistence
//!
//! Rounds are written once, inside the transaction that reads the active item
//! set, and nothing here ever consults the catalog again.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tq_common::{time, Error, Result};
use uuid::Uuid;

use super::{catalog, parse_guid};
use crate::models::{Difficulty, GameSession, SessionRound};

/// Snapshot the artist's active items into a new session
///
/// Fails with `Validation` when the artist has no active items.
pub async fn create_session(
    pool: &SqlitePool,
    player_id: Uuid,
    artist: &str,
    difficulty: Difficulty,
    at_ms: i64,
) -> Result<GameSession> {
    let mut tx = pool.begin().await?;

    let mut item_ids = catalog::active_item_ids(&mut *tx, artist).await?;
    if item_ids.is_empty() {
        return Err(Error::Validation(format!(
            "No eligible items for artist '{}'",
            artist
        )));
    }
    item_ids.shuffle(&mut StdRng::from_entropy());

    let session_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO game_sessions (guid, player_id, artist, difficulty, created_at_ms)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id.to_string())
    .bind(player_id.to_string())
    .bind(artist)
    .bind(difficulty.as_str())
    .bind(at_ms)
    .execute(&mut *tx)
    .await?;

    let mut rounds = Vec::with_capacity(item_ids.len());
    for (idx, item_id) in item_ids.into_iter().enumerate() {
        let round_no = idx as i64 + 1;
        sqlx::query("INSERT INTO session_rounds (session_id, round_no, item_id) VALUES (?, ?, ?)")
            .bind(session_id.to_string())
            .bind(round_no)
            .bind(item_id.to_string())
            .execute(&mut *tx)
            .await?;

        rounds.push(SessionRound {
            round_no,
            item_id,
            answered: false,
            correct: false,
            answered_at: None,
        });
    }

    tx.commit().await?;

    Ok(GameSession {
        guid: session_id,
        player_id,
        artist: artist.to_string(),
        difficulty,
        created_at: time::from_millis(at_ms)?,
        finished_at: None,
        duration_ms: None,
        rounds,
    })
}

/// Load a session with its rounds in play order
pub async fn load_session(
    conn: &mut SqliteConnection,
    session_id: Uuid,
) -> Result<Option<GameSession>> {
    let row = sqlx::query(
        r#"
        SELECT guid, player_id, artist, difficulty, created_at_ms, finished_at_ms, duration_ms
        FROM game_sessions
        WHERE guid = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let round_rows = sqlx::query(
        r#"
        SELECT round_no, item_id, answered, correct, answered_at_ms
        FROM session_rounds
        WHERE session_id = ?
        ORDER BY round_no
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut rounds = Vec::with_capacity(round_rows.len());
    for r in &round_rows {
        let item_id: String = r.try_get("item_id")?;
        let answered_at: Option<i64> = r.try_get("answered_at_ms")?;
        rounds.push(SessionRound {
            round_no: r.try_get("round_no")?,
            item_id: parse_guid("item_id", &item_id)?,
            answered: r.try_get("answered")?,
            correct: r.try_get("correct")?,
            answered_at: answered_at.map(time::from_millis).transpose()?,
        });
    }

    let player_id: String = row.try_get("player_id")?;
    let difficulty: String = row.try_get("difficulty")?;
    let finished_at: Option<i64> = row.try_get("finished_at_ms")?;

    Ok(Some(GameSession {
        guid: session_id,
        player_id: parse_guid("player_id", &player_id)?,
        artist: row.try_get("artist")?,
        difficulty: difficulty.parse()?,
        created_at: time::from_millis(row.try_get("created_at_ms")?)?,
        finished_at: finished_at.map(time::from_millis).transpose()?,
        duration_ms: row.try_get("duration_ms")?,
        rounds,
    }))
}

/// Record the answer for one round of an open session
pub async fn record_answer(
    pool: &SqlitePool,
    session_id: Uuid,
    item_id: Uuid,
    correct: bool,
    at_ms: i64,
) -> Result<SessionRound> {
    let mut tx = pool.begin().await?;

    let session = load_session(&mut tx, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Game session not found: {}", session_id)))?;

    if session.is_finished() {
        return Err(Error::Validation(format!(
            "Game session {} is already finished",
            session_id
        )));
    }

    let round = session
        .rounds
        .iter()
        .find(|r| r.item_id == item_id)
        .ok_or_else(|| {
            Error::NotFound(format!("Item {} is not part of session {}", item_id, session_id))
        })?;

    if round.answered {
        return Err(Error::Validation(format!(
            "Round {} of session {} was already answered",
            round.round_no, session_id
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE session_rounds
        SET answered = 1, correct = ?, answered_at_ms = ?
        WHERE session_id = ? AND item_id = ? AND answered = 0
        "#,
    )
    .bind(correct)
    .bind(at_ms)
    .bind(session_id.to_string())
    .bind(item_id.to_string())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::ConcurrencyConflict(format!(
            "Round {} of session {} was answered concurrently",
            round.round_no, session_id
        )));
    }

    tx.commit().await?;

    Ok(SessionRound {
        round_no: round.round_no,
        item_id,
        answered: true,
        correct,
        answered_at: Some(time::from_millis(at_ms)?),
    })
}

/// Close an open session; must run inside the caller's transaction
pub async fn mark_finished(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    duration_ms: i64,
    at_ms: i64,
) -> Result<GameSession> {
    let updated = sqlx::query(
        r#"
        UPDATE game_sessions
        SET finished_at_ms = ?, duration_ms = ?
        WHERE guid = ? AND finished_at_ms IS NULL
        "#,
    )
    .bind(at_ms)
    .bind(duration_ms)
    .bind(session_id.to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let session = load_session(conn, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Game session not found: {}", session_id)))?;

    if updated == 0 {
        return Err(Error::Validation(format!(
            "Game session {} is already finished",
            session_id
        )));
    }

    Ok(session)
}
