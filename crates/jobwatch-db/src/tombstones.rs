//! Database operations for `removed_tombstones`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A tombstone joined with its source title.
///
/// `source_title` is `None` when the source has since been deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TombstoneRow {
    pub id: i64,
    pub posting_id: i64,
    pub source_id: Option<i64>,
    pub source_title: Option<String>,
    pub source_url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub removed_at: DateTime<Utc>,
    pub notified: bool,
}

/// Returns every tombstone that has not yet been included in a successful
/// digest, ordered by source title and removal time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_tombstones(pool: &PgPool) -> Result<Vec<TombstoneRow>, DbError> {
    let rows = sqlx::query_as::<_, TombstoneRow>(
        "SELECT t.id, t.posting_id, t.source_id, s.title AS source_title, t.source_url, \
                t.title, t.company, t.location, t.link, t.removed_at, t.notified \
         FROM removed_tombstones t \
         LEFT JOIN sources s ON s.id = t.source_id \
         WHERE t.notified = FALSE \
         ORDER BY s.title NULLS LAST, t.removed_at, t.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Flips `notified` on exactly the given tombstones. Returns how many rows
/// changed; ids already notified or since purged are ignored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_tombstones_notified(pool: &PgPool, ids: &[i64]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE removed_tombstones \
         SET notified = TRUE \
         WHERE id = ANY($1) AND notified = FALSE",
    )
    .bind(ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
