//! Database operations for the append-only `failures` log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

/// Classification stored in `failures.error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DispatchFailure,
    RunError,
    ReconciliationError,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::DispatchFailure => "dispatch_failure",
            FailureKind::RunError => "run_error",
            FailureKind::ReconciliationError => "reconciliation_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewFailure<'a> {
    pub source_id: i64,
    pub source_url: &'a str,
    pub kind: FailureKind,
    pub message: &'a str,
    pub trace: &'a str,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FailureRow {
    pub id: i64,
    pub source_id: Option<i64>,
    pub source_url: String,
    pub error_kind: String,
    pub message: String,
    pub trace: String,
    pub failed_at: DateTime<Utc>,
}

/// Appends a failure record and returns it.
///
/// A source deleted while its run was in flight is stored with a NULL
/// `source_id`; the snapshotted URL still identifies it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_failure(pool: &PgPool, failure: &NewFailure<'_>) -> Result<FailureRow, DbError> {
    let row = sqlx::query_as::<_, FailureRow>(
        "INSERT INTO failures (source_id, source_url, error_kind, message, trace) \
         VALUES ((SELECT id FROM sources WHERE id = $1), $2, $3, $4, $5) \
         RETURNING id, source_id, source_url, error_kind, message, trace, failed_at",
    )
    .bind(failure.source_id)
    .bind(failure.source_url)
    .bind(failure.kind.as_str())
    .bind(failure.message)
    .bind(failure.trace)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns the most recent failures, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_failures(pool: &PgPool, limit: i64) -> Result<Vec<FailureRow>, DbError> {
    let rows = sqlx::query_as::<_, FailureRow>(
        "SELECT id, source_id, source_url, error_kind, message, trace, failed_at \
         FROM failures \
         ORDER BY failed_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
