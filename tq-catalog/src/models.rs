//! Domain types shared by the store, services and HTTP handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tq_common::Error;
use uuid::Uuid;

/// A playable song, indexed by artist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub guid: Uuid,
    pub artist: String,
    pub title: String,
    /// Cache of the latest history state
    pub active: bool,
    /// Optimistic concurrency counter, bumped on every mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// History log action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Added,
    Deleted,
    Restored,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Added => "ADDED",
            HistoryAction::Deleted => "DELETED",
            HistoryAction::Restored => "RESTORED",
        }
    }

    /// Whether an item whose latest event is this action counts as active
    pub fn is_active(&self) -> bool {
        !matches!(self, HistoryAction::Deleted)
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADDED" => Ok(HistoryAction::Added),
            "DELETED" => Ok(HistoryAction::Deleted),
            "RESTORED" => Ok(HistoryAction::Restored),
            other => Err(Error::IntegrityViolation(format!(
                "Unknown history action: {}",
                other
            ))),
        }
    }
}

/// One row of the append-only history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub seq: i64,
    pub item_id: Uuid,
    pub artist: String,
    pub action: HistoryAction,
    pub occurred_at: DateTime<Utc>,
}

/// Result of a SoftDelete / Restore call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// State changed and a history event was appended
    Applied,
    /// Item was already in the requested state; nothing was written
    Unchanged,
}

/// Quiz difficulty; achievements are tracked per difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Normal => "NORMAL",
            Difficulty::Hard => "HARD",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EASY" => Ok(Difficulty::Easy),
            "NORMAL" => Ok(Difficulty::Normal),
            "HARD" => Ok(Difficulty::Hard),
            other => Err(Error::Validation(format!("Unknown difficulty: {}", other))),
        }
    }
}

/// Lifecycle state derived from the two perfect flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementState {
    Achieved,
    CurrentInvalid,
    Retired,
}

/// Per-player, per-artist, per-difficulty perfect clear
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementRecord {
    pub guid: Uuid,
    pub player_id: Uuid,
    pub artist: String,
    pub difficulty: Difficulty,
    /// Catalog size the player faced when the clear happened
    pub achieved_total: i64,
    pub correct_count: i64,
    pub achieved_at: DateTime<Utc>,
    pub best_duration_ms: i64,
    /// Permanent badge; only ever revoked when the artist's catalog empties
    pub achieved_perfect: bool,
    /// Whether the clear still matches the live catalog size
    pub current_perfect: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl AchievementRecord {
    pub fn state(&self) -> AchievementState {
        match (self.achieved_perfect, self.current_perfect) {
            (true, true) => AchievementState::Achieved,
            (true, false) => AchievementState::CurrentInvalid,
            // currentPerfect never outlives achievedPerfect
            (false, _) => AchievementState::Retired,
        }
    }
}

/// Input for recording a qualifying clear
#[derive(Debug, Clone)]
pub struct NewPerfectClear {
    pub player_id: Uuid,
    pub artist: String,
    pub difficulty: Difficulty,
    pub achieved_total: i64,
    pub correct_count: i64,
    pub duration_ms: i64,
}

/// What recording a clear did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearOutcome {
    Created,
    /// Existing record kept; best duration lowered
    Improved,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedClear {
    pub outcome: ClearOutcome,
    pub record: AchievementRecord,
}

/// One frozen round of a game session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRound {
    pub round_no: i64,
    pub item_id: Uuid,
    pub answered: bool,
    pub correct: bool,
    pub answered_at: Option<DateTime<Utc>>,
}

/// A game session and the item snapshot taken when it started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub guid: Uuid,
    pub player_id: Uuid,
    pub artist: String,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub rounds: Vec<SessionRound>,
}

impl GameSession {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn correct_count(&self) -> i64 {
        self.rounds.iter().filter(|r| r.correct).count() as i64
    }

    pub fn total(&self) -> i64 {
        self.rounds.len() as i64
    }
}

/// Outcome of finishing a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub correct_count: i64,
    pub total: i64,
    pub perfect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievement: Option<RecordedClear>,
}

/// Counters returned by one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Records inspected and stamped
    pub processed_count: u64,
    /// Records whose currentPerfect went from true to false
    pub invalidated_count: u64,
    /// Records whose currentPerfect went from false to true
    pub revalidated_count: u64,
    /// Records whose achievedPerfect was revoked this run
    pub retired_count: u64,
    /// Records skipped because their update failed
    pub failed_count: u64,
    /// Distinct artists whose live count was computed
    pub artist_count: u64,
}

/// One display row of an artist ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    pub rank: u32,
    pub record_id: Uuid,
    pub player_id: Uuid,
    pub difficulty: Difficulty,
    pub achieved_clear_rate: f64,
    pub current_clear_rate: f64,
    pub current_perfect: bool,
    pub achieved_perfect: bool,
    pub best_duration_ms: i64,
    pub achieved_at: DateTime<Utc>,
}
