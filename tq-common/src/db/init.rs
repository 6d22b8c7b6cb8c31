//! Database initialization
//!
//! Opens (creating if missing) the shared SQLite database, applies connection
//! pragmas, creates every table idempotently and seeds default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL lets the reconciliation batch read while catalog mutations commit
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_catalog_items_table(pool).await?;
    create_item_history_table(pool).await?;
    create_achievement_records_table(pool).await?;
    create_game_sessions_tables(pool).await?;
    create_batch_leases_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores runtime tunables as key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Canonical item rows; `active` caches the latest history state
async fn create_catalog_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_items (
            guid TEXT PRIMARY KEY,
            artist TEXT NOT NULL,
            title TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            version INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_items_artist_active ON catalog_items(artist, active)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only item history
///
/// `seq` orders events that share a millisecond.
async fn create_item_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_history (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL REFERENCES catalog_items(guid),
            artist TEXT NOT NULL,
            action TEXT NOT NULL CHECK (action IN ('ADDED', 'DELETED', 'RESTORED')),
            occurred_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_item_history_artist_time ON item_history(artist, occurred_at_ms)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_item_history_item_time ON item_history(item_id, occurred_at_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_achievement_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS achievement_records (
            guid TEXT PRIMARY KEY,
            player_id TEXT NOT NULL,
            artist TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            achieved_total INTEGER NOT NULL CHECK (achieved_total > 0),
            correct_count INTEGER NOT NULL,
            achieved_at_ms INTEGER NOT NULL,
            best_duration_ms INTEGER NOT NULL,
            achieved_perfect INTEGER NOT NULL DEFAULT 1,
            current_perfect INTEGER NOT NULL DEFAULT 1,
            last_checked_at_ms INTEGER,
            UNIQUE (player_id, artist, difficulty)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_achievement_records_artist ON achievement_records(artist)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_achievement_records_check ON achievement_records(current_perfect, last_checked_at_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Game sessions and their frozen rounds
async fn create_game_sessions_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS game_sessions (
            guid TEXT PRIMARY KEY,
            player_id TEXT NOT NULL,
            artist TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL,
            finished_at_ms INTEGER,
            duration_ms INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_rounds (
            session_id TEXT NOT NULL REFERENCES game_sessions(guid),
            round_no INTEGER NOT NULL,
            item_id TEXT NOT NULL REFERENCES catalog_items(guid),
            answered INTEGER NOT NULL DEFAULT 0,
            correct INTEGER NOT NULL DEFAULT 0,
            answered_at_ms INTEGER,
            PRIMARY KEY (session_id, round_no),
            UNIQUE (session_id, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_batch_leases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_leases (
            name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            expires_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist; NULL values are reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // History retention
    ensure_setting(pool, "history_retention_days", "365").await?;

    // Reconciliation batch
    ensure_setting(pool, "reconciliation_stale_after_secs", "604800").await?; // 7 days
    ensure_setting(pool, "reconciliation_lease_secs", "3600").await?;

    // Lock contention handling
    ensure_setting(pool, "db_max_lock_wait_ms", "5000").await?;

    // Ranking
    ensure_setting(pool, "ranking_max_limit", "500").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent initialization from several nodes
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query(
        "UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ? AND value IS NULL",
    )
    .bind(default_value)
    .bind(key)
    .execute(pool)
    .await?
    .rows_affected();

    if reset > 0 {
        info!("Reset NULL setting '{}' to default value: {}", key, default_value);
    }

    Ok(())
}
