//! Tests for database initialization
//!
//! Covers automatic database creation, idempotent re-open, schema presence and
//! default settings.

use tempfile::TempDir;
use tq_common::db::{get_setting, get_setting_or, init_database, set_setting};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("tunequiz.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());

    // Parent directory and file were created
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tunequiz.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO catalog_items (guid, artist, title, active, version, created_at_ms, updated_at_ms)
         VALUES ('a', 'Artist', 'Song', 1, 0, 0, 0)",
    )
    .execute(&pool1)
    .await
    .unwrap();
    pool1.close().await;

    // Second open must keep existing rows
    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("tunequiz.db")).await.unwrap();

    for table in [
        "settings",
        "catalog_items",
        "item_history",
        "achievement_records",
        "game_sessions",
        "session_rounds",
        "batch_leases",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_history_action_is_constrained() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("tunequiz.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO catalog_items (guid, artist, title, active, version, created_at_ms, updated_at_ms)
         VALUES ('a', 'Artist', 'Song', 1, 0, 0, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        "INSERT INTO item_history (item_id, artist, action, occurred_at_ms) VALUES ('a', 'Artist', 'RENAMED', 0)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "Unknown action should be rejected");
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("tunequiz.db")).await.unwrap();

    let retention: Option<i64> = get_setting(&pool, "history_retention_days").await.unwrap();
    assert_eq!(retention, Some(365));

    let stale: i64 = get_setting_or(&pool, "reconciliation_stale_after_secs", 0).await.unwrap();
    assert_eq!(stale, 604_800);

    let missing: Option<i64> = get_setting(&pool, "no_such_setting").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_settings_survive_reinitialization() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tunequiz.db");

    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, "history_retention_days", 30).await.unwrap();
    pool.close().await;

    // Defaults must not overwrite an operator's value
    let pool = init_database(&db_path).await.unwrap();
    let retention: i64 = get_setting_or(&pool, "history_retention_days", 0).await.unwrap();
    assert_eq!(retention, 30);
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tunequiz.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'db_max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let wait: Option<i64> = get_setting(&pool, "db_max_lock_wait_ms").await.unwrap();
    assert_eq!(wait, Some(5000));
}

#[tokio::test]
async fn test_unparseable_setting_is_config_error() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("tunequiz.db")).await.unwrap();

    set_setting(&pool, "history_retention_days", "forever").await.unwrap();
    let result: tq_common::Result<Option<i64>> =
        get_setting(&pool, "history_retention_days").await;
    assert!(matches!(result, Err(tq_common::Error::Config(_))));
}
