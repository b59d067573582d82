//! Database operations for `live_postings`, including the transactional
//! reconciliation that turns a crawl result into inserts and tombstones.

use chrono::{DateTime, Utc};
use jobwatch_core::{diff_postings, Posting};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `live_postings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LivePostingRow {
    pub id: i64,
    pub source_id: i64,
    pub source_url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub first_seen_at: DateTime<Utc>,
}

/// A live posting joined with its source title, as shown in the digest.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DigestPostingRow {
    pub id: i64,
    pub source_title: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub first_seen_at: DateTime<Utc>,
}

/// Counts produced by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub confirmed: usize,
    pub removed: usize,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns the live postings of one source, ordered by first sighting.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_live_postings(
    pool: &PgPool,
    source_id: i64,
) -> Result<Vec<LivePostingRow>, DbError> {
    let rows = sqlx::query_as::<_, LivePostingRow>(
        "SELECT id, source_id, source_url, title, company, location, link, first_seen_at \
         FROM live_postings \
         WHERE source_id = $1 \
         ORDER BY first_seen_at, id",
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns live postings first seen at or after `since`, across all sources,
/// ordered by source title.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_postings_first_seen_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<DigestPostingRow>, DbError> {
    let rows = sqlx::query_as::<_, DigestPostingRow>(
        "SELECT p.id, s.title AS source_title, p.title, p.company, p.location, p.link, \
                p.first_seen_at \
         FROM live_postings p \
         JOIN sources s ON s.id = p.source_id \
         WHERE p.first_seen_at >= $1 \
         ORDER BY s.title, p.first_seen_at, p.id",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Applies a successful crawl result for `(source_id, source_url)`.
///
/// Within one transaction, holding an advisory lock keyed on `source_id`:
/// new links are inserted, confirmed links are left untouched, and every
/// live link absent from `postings` is snapshotted into `removed_tombstones`
/// and deleted. Any failure rolls the whole diff back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is committed.
pub async fn reconcile_postings(
    pool: &PgPool,
    source_id: i64,
    source_url: &str,
    postings: &[Posting],
) -> Result<ReconcileSummary, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

    let live = sqlx::query_as::<_, LivePostingRow>(
        "SELECT id, source_id, source_url, title, company, location, link, first_seen_at \
         FROM live_postings \
         WHERE source_id = $1 AND source_url = $2",
    )
    .bind(source_id)
    .bind(source_url)
    .fetch_all(&mut *tx)
    .await?;

    let diff = diff_postings(live, |row| row.link.as_str(), postings);

    if !diff.inserted.is_empty() {
        let titles: Vec<&str> = diff.inserted.iter().map(|p| p.title.as_str()).collect();
        let companies: Vec<&str> = diff.inserted.iter().map(|p| p.company.as_str()).collect();
        let locations: Vec<&str> = diff.inserted.iter().map(|p| p.location.as_str()).collect();
        let links: Vec<&str> = diff.inserted.iter().map(|p| p.link.as_str()).collect();

        sqlx::query(
            "INSERT INTO live_postings (source_id, source_url, title, company, location, link) \
             SELECT $1, $2, t.title, t.company, t.location, t.link \
             FROM UNNEST($3::text[], $4::text[], $5::text[], $6::text[]) \
                  AS t(title, company, location, link)",
        )
        .bind(source_id)
        .bind(source_url)
        .bind(&titles)
        .bind(&companies)
        .bind(&locations)
        .bind(&links)
        .execute(&mut *tx)
        .await?;
    }

    if !diff.removed.is_empty() {
        let removed_ids: Vec<i64> = diff.removed.iter().map(|row| row.id).collect();

        sqlx::query(
            "INSERT INTO removed_tombstones \
                 (posting_id, source_id, source_url, title, company, location, link) \
             SELECT id, source_id, source_url, title, company, location, link \
             FROM live_postings \
             WHERE id = ANY($1)",
        )
        .bind(&removed_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM live_postings WHERE id = ANY($1)")
            .bind(&removed_ids)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let summary = ReconcileSummary {
        inserted: diff.inserted.len(),
        confirmed: diff.confirmed,
        removed: diff.removed.len(),
    };

    tracing::debug!(
        source_id,
        source_url,
        inserted = summary.inserted,
        confirmed = summary.confirmed,
        removed = summary.removed,
        "reconciled postings"
    );

    Ok(summary)
}
