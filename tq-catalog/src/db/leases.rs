//! Advisory batch leases
//!
//! A lease row names the node currently running a batch. It only prevents
//! redundant work; batches stay correct without it.

use sqlx::SqlitePool;
use tq_common::Result;

/// Take `name` for `holder` until `expires_at_ms`
///
/// Succeeds when no lease exists, the existing one has expired, or `holder`
/// already owns it (renewal).
pub async fn try_acquire(
    pool: &SqlitePool,
    name: &str,
    holder: &str,
    now_ms: i64,
    expires_at_ms: i64,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        INSERT INTO batch_leases (name, holder, expires_at_ms)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            holder = excluded.holder,
            expires_at_ms = excluded.expires_at_ms
        WHERE batch_leases.expires_at_ms <= ? OR batch_leases.holder = excluded.holder
        "#,
    )
    .bind(name)
    .bind(holder)
    .bind(expires_at_ms)
    .bind(now_ms)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected > 0)
}

/// Drop `name` if `holder` still owns it
pub async fn release(pool: &SqlitePool, name: &str, holder: &str) -> Result<()> {
    sqlx::query("DELETE FROM batch_leases WHERE name = ? AND holder = ?")
        .bind(name)
        .bind(holder)
        .execute(pool)
        .await?;

    Ok(())
}
