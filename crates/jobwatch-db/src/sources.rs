//! Database operations for `sources` and `source_keywords`.

use chrono::{DateTime, Utc};
use jobwatch_core::{ConfigError, Schedule, SourceConfig};
use sqlx::{PgPool, Postgres, Transaction};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from `sources` with its keywords aggregated in insertion order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub title: String,
    pub url: String,
    /// `HH:MM`, UTC.
    pub schedule_time: String,
    pub schedule_days: Vec<String>,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRow {
    /// Parse the stored schedule into a [`SourceConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSchedule`] when the stored time or
    /// weekday names do not parse.
    pub fn to_config(&self) -> Result<SourceConfig, ConfigError> {
        Ok(SourceConfig {
            id: self.id,
            title: self.title.clone(),
            url: self.url.clone(),
            schedule: Schedule::parse(&self.schedule_time, &self.schedule_days)?,
            keywords: self.keywords.clone(),
        })
    }
}

/// Fields for creating or replacing a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub title: String,
    pub url: String,
    pub schedule: Schedule,
    pub keywords: Vec<String>,
}

const SOURCE_SELECT: &str = "\
    SELECT s.id, s.title, s.url, s.schedule_time, s.schedule_days, \
           COALESCE(array_agg(k.keyword ORDER BY k.id) FILTER (WHERE k.id IS NOT NULL), '{}') \
               AS keywords, \
           s.created_at, s.updated_at \
    FROM sources s \
    LEFT JOIN source_keywords k ON k.source_id = s.id";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns every source with its keywords, ordered by id.
///
/// Rows are returned unparsed so a caller can isolate a single malformed
/// schedule instead of failing the whole listing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sources(pool: &PgPool) -> Result<Vec<SourceRow>, DbError> {
    let sql = format!("{SOURCE_SELECT} GROUP BY s.id ORDER BY s.id");
    let rows = sqlx::query_as::<_, SourceRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Returns a single source by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_source(pool: &PgPool, id: i64) -> Result<Option<SourceRow>, DbError> {
    let sql = format!("{SOURCE_SELECT} WHERE s.id = $1 GROUP BY s.id");
    let row = sqlx::query_as::<_, SourceRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Inserts a source and its keywords in one transaction and returns the
/// stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn create_source(pool: &PgPool, source: &NewSource) -> Result<SourceRow, DbError> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sources (title, url, schedule_time, schedule_days) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id",
    )
    .bind(&source.title)
    .bind(&source.url)
    .bind(source.schedule.time_string())
    .bind(source.schedule.day_names())
    .fetch_one(&mut *tx)
    .await?;

    insert_keywords(&mut tx, id, &source.keywords).await?;
    tx.commit().await?;

    get_source(pool, id).await?.ok_or(DbError::NotFound)
}

/// Replaces a source's fields and keyword set.
///
/// When the URL changes, postings still live under the old URL are
/// tombstoned in the same transaction; no later run would reconcile them.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no source has `id`, or [`DbError::Sqlx`]
/// if any statement fails.
pub async fn update_source(
    pool: &PgPool,
    id: i64,
    source: &NewSource,
) -> Result<SourceRow, DbError> {
    let mut tx = pool.begin().await?;

    // Same key as reconciliation, so an in-flight diff cannot interleave.
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        "UPDATE sources \
         SET title = $1, url = $2, schedule_time = $3, schedule_days = $4, updated_at = NOW() \
         WHERE id = $5",
    )
    .bind(&source.title)
    .bind(&source.url)
    .bind(source.schedule.time_string())
    .bind(source.schedule.day_names())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    let stale = retire_postings_not_under(&mut tx, id, &source.url).await?;
    if stale > 0 {
        tracing::info!(
            source_id = id,
            url = %source.url,
            removed = stale,
            "source url changed; tombstoned postings under the old url"
        );
    }

    sqlx::query("DELETE FROM source_keywords WHERE source_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_keywords(&mut tx, id, &source.keywords).await?;
    tx.commit().await?;

    get_source(pool, id).await?.ok_or(DbError::NotFound)
}

/// Deletes a source. Live postings and keywords cascade; tombstones and
/// failures keep their snapshot with a NULL `source_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no source has `id`, or [`DbError::Sqlx`]
/// if the delete fails.
pub async fn delete_source(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM sources WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Tombstones and deletes live postings of `source_id` recorded under any
/// URL other than `url`. Returns how many were retired.
async fn retire_postings_not_under(
    tx: &mut Transaction<'_, Postgres>,
    source_id: i64,
    url: &str,
) -> Result<u64, DbError> {
    sqlx::query(
        "INSERT INTO removed_tombstones \
             (posting_id, source_id, source_url, title, company, location, link) \
         SELECT id, source_id, source_url, title, company, location, link \
         FROM live_postings \
         WHERE source_id = $1 AND source_url <> $2",
    )
    .bind(source_id)
    .bind(url)
    .execute(&mut **tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM live_postings WHERE source_id = $1 AND source_url <> $2")
        .bind(source_id)
        .bind(url)
        .execute(&mut **tx)
        .await?;

    Ok(deleted.rows_affected())
}

async fn insert_keywords(
    tx: &mut Transaction<'_, Postgres>,
    source_id: i64,
    keywords: &[String],
) -> Result<(), DbError> {
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO source_keywords (source_id, keyword) \
         SELECT $1, kw FROM UNNEST($2::text[]) WITH ORDINALITY AS t(kw, ord) ORDER BY ord",
    )
    .bind(source_id)
    .bind(&keywords)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
