//! Retention sweep for tombstones and failure records.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub tombstones: u64,
    pub failures: u64,
}

/// Deletes notified tombstones removed before `cutoff` and failures recorded
/// before `cutoff`. Unnotified tombstones are kept regardless of age.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either delete fails; both run in one
/// transaction.
pub async fn purge_expired(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<PurgeSummary, DbError> {
    let mut tx = pool.begin().await?;

    let tombstones =
        sqlx::query("DELETE FROM removed_tombstones WHERE notified = TRUE AND removed_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

    let failures = sqlx::query("DELETE FROM failures WHERE failed_at < $1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    Ok(PurgeSummary {
        tombstones,
        failures,
    })
}
