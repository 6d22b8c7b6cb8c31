//! Game Session Snapshot
//!
//! A session freezes the artist's active items when it starts. Answers and
//! completion only read that snapshot, so later catalog edits never reach an
//! in-progress session.

use sqlx::SqlitePool;
use tq_common::{time, Error, Result, SharedClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::achievements::{log_recorded, validate_clear};
use crate::db;
use crate::models::{Difficulty, GameSession, NewPerfectClear, SessionResult, SessionRound};
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct SessionService {
    db: SqlitePool,
    clock: SharedClock,
    max_lock_wait_ms: u64,
}

impl SessionService {
    pub fn new(db: SqlitePool, clock: SharedClock, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            clock,
            max_lock_wait_ms,
        }
    }

    /// Start a session over the artist's currently active items
    ///
    /// Fails with `Validation` when the artist has none.
    pub async fn start_session(
        &self,
        player_id: Uuid,
        artist: &str,
        difficulty: Difficulty,
    ) -> Result<GameSession> {
        let artist = artist.trim();
        if artist.is_empty() {
            return Err(Error::Validation("artist must not be blank".to_string()));
        }

        let session = retry_on_lock("start_session", self.max_lock_wait_ms, || async move {
            let at_ms = time::to_millis(self.clock.now());
            db::sessions::create_session(&self.db, player_id, artist, difficulty, at_ms).await
        })
        .await?;

        info!(
            session_id = %session.guid,
            player_id = %player_id,
            artist,
            rounds = session.total(),
            "Game session started"
        );
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<GameSession> {
        let mut conn = self.db.acquire().await?;
        db::sessions::load_session(&mut conn, session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Game session not found: {}", session_id)))
    }

    /// Record whether the player got `item_id` right
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        correct: bool,
    ) -> Result<SessionRound> {
        let round = retry_on_lock("submit_answer", self.max_lock_wait_ms, || async move {
            let at_ms = time::to_millis(self.clock.now());
            db::sessions::record_answer(&self.db, session_id, item_id, correct, at_ms).await
        })
        .await?;

        debug!(session_id = %session_id, item_id = %item_id, correct, "Answer recorded");
        Ok(round)
    }

    /// Close the session and record a perfect clear if every round was correct
    ///
    /// Finishing and recording the clear commit together.
    pub async fn finish_session(&self, session_id: Uuid, duration_ms: i64) -> Result<SessionResult> {
        if duration_ms < 0 {
            return Err(Error::Validation("duration_ms must not be negative".to_string()));
        }

        let result = retry_on_lock("finish_session", self.max_lock_wait_ms, || async move {
            self.finish_once(session_id, duration_ms).await
        })
        .await;

        match &result {
            Ok(outcome) => info!(
                session_id = %session_id,
                correct = outcome.correct_count,
                total = outcome.total,
                perfect = outcome.perfect,
                "Game session finished"
            ),
            Err(e) => warn!(session_id = %session_id, error = %e, "Finishing game session failed"),
        }
        result
    }

    async fn finish_once(&self, session_id: Uuid, duration_ms: i64) -> Result<SessionResult> {
        let at_ms = time::to_millis(self.clock.now());
        let mut tx = self.db.begin().await?;

        let session = db::sessions::mark_finished(&mut tx, session_id, duration_ms, at_ms).await?;
        let correct_count = session.correct_count();
        let total = session.total();
        let perfect = total > 0 && correct_count == total;

        let achievement = if perfect {
            let clear = NewPerfectClear {
                player_id: session.player_id,
                artist: session.artist.clone(),
                difficulty: session.difficulty,
                achieved_total: total,
                correct_count,
                duration_ms,
            };
            validate_clear(&clear)?;
            Some(db::achievements::upsert_perfect_clear(&mut tx, &clear, at_ms).await?)
        } else {
            None
        };

        tx.commit().await?;

        if let Some(recorded) = &achievement {
            log_recorded(recorded);
        }

        Ok(SessionResult {
            session_id,
            correct_count,
            total,
            perfect,
            achievement,
        })
    }
}
