//! Settings table accessors
//!
//! Values are stored as text and parsed on read.

use sqlx::SqlitePool;

use crate::{Error, Result};

/// Read and parse a setting; `None` when the key is absent or NULL
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(value) => {
            let parsed = value.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("Parse setting '{}' failed: {}", key, e))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Read a setting, falling back to `default` when absent
pub async fn get_setting_or<T>(db: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(get_setting(db, key).await?.unwrap_or(default))
}

/// Insert or overwrite a setting
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
