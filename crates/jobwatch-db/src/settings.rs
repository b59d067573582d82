//! Runtime settings stored in the `settings` key/value table.

use chrono::NaiveTime;
use jobwatch_core::{parse_time_of_day, DEFAULT_DIGEST_TIME};
use sqlx::PgPool;

use crate::DbError;

pub const DIGEST_TIME_KEY: &str = "digest_time";

/// Returns the raw value of a setting, or `None` if it is unset.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_setting(pool: &PgPool, name: &str) -> Result<Option<String>, DbError> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Inserts or overwrites a setting.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_setting(pool: &PgPool, name: &str, value: &str) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO settings (name, value) VALUES ($1, $2) \
         ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value",
    )
    .bind(name)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the configured digest time, falling back to the default when the
/// row is missing.
///
/// # Errors
///
/// Returns [`DbError::InvalidValue`] if the stored value is not `HH:MM`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_digest_time(pool: &PgPool) -> Result<NaiveTime, DbError> {
    let raw = get_setting(pool, DIGEST_TIME_KEY)
        .await?
        .unwrap_or_else(|| DEFAULT_DIGEST_TIME.to_string());
    parse_time_of_day(&raw).map_err(|e| DbError::InvalidValue(e.to_string()))
}

/// Stores the digest time as `HH:MM`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_digest_time(pool: &PgPool, time: NaiveTime) -> Result<(), DbError> {
    set_setting(pool, DIGEST_TIME_KEY, &time.format("%H:%M").to_string()).await
}
