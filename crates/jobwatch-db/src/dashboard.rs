//! Read-model queries behind the `jobwatch-server` stats endpoint.
//!
//! Days are UTC calendar days, the same boundary the daily digest uses.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

/// Number of calendar days covered by [`DashboardStats::trend`], today included.
pub const TREND_DAYS: i64 = 30;

/// How many source URLs [`DashboardStats::postings_per_url`] lists.
pub const TOP_SOURCE_URLS: i64 = 10;

#[derive(Debug, Clone, sqlx::FromRow)]
struct HeadlineCounts {
    active_postings: i64,
    new_today: i64,
    removed_today: i64,
    source_count: i64,
}

/// Live posting count for one crawled URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UrlPostingCountRow {
    pub source_url: String,
    pub postings: i64,
}

/// A source with its most recent failure, if it ever failed.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SourceLastFailureRow {
    pub source_id: i64,
    pub title: String,
    pub source_url: String,
    pub error_kind: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// New and removed posting counts for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendDay {
    pub day: NaiveDate,
    pub new_postings: i64,
    pub removed_postings: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TrendRow {
    day_start: DateTime<Utc>,
    new_postings: i64,
    removed_postings: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub active_postings: i64,
    pub new_today: i64,
    pub removed_today: i64,
    pub source_count: i64,
    pub postings_per_url: Vec<UrlPostingCountRow>,
    pub last_failures: Vec<SourceLastFailureRow>,
    /// Oldest day first, ending with today.
    pub trend: Vec<TrendDay>,
}

/// Collects the dashboard overview as of `now`.
///
/// "New" counts postings still live whose first sighting falls on the day;
/// postings that were found and removed again only show up as removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any query fails.
pub async fn dashboard_stats(pool: &PgPool, now: DateTime<Utc>) -> Result<DashboardStats, DbError> {
    let today_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let trend_start = today_start - Duration::days(TREND_DAYS - 1);

    let headline = sqlx::query_as::<_, HeadlineCounts>(
        "SELECT \
             (SELECT COUNT(*) FROM live_postings) AS active_postings, \
             (SELECT COUNT(*) FROM live_postings WHERE first_seen_at >= $1) AS new_today, \
             (SELECT COUNT(*) FROM removed_tombstones WHERE removed_at >= $1) AS removed_today, \
             (SELECT COUNT(*) FROM sources) AS source_count",
    )
    .bind(today_start)
    .fetch_one(pool)
    .await?;

    let postings_per_url = sqlx::query_as::<_, UrlPostingCountRow>(
        "SELECT source_url, COUNT(*) AS postings \
         FROM live_postings \
         GROUP BY source_url \
         ORDER BY postings DESC, source_url \
         LIMIT $1",
    )
    .bind(TOP_SOURCE_URLS)
    .fetch_all(pool)
    .await?;

    let last_failures = sqlx::query_as::<_, SourceLastFailureRow>(
        "SELECT s.id AS source_id, s.title, s.url AS source_url, f.error_kind, f.failed_at \
         FROM sources s \
         LEFT JOIN LATERAL ( \
             SELECT error_kind, failed_at FROM failures \
             WHERE source_id = s.id \
             ORDER BY failed_at DESC, id DESC \
             LIMIT 1 \
         ) f ON TRUE \
         ORDER BY f.failed_at DESC NULLS LAST, s.id",
    )
    .fetch_all(pool)
    .await?;

    let trend = sqlx::query_as::<_, TrendRow>(
        "SELECT d AS day_start, \
             (SELECT COUNT(*) FROM live_postings \
              WHERE first_seen_at >= d AND first_seen_at < d + INTERVAL '1 day') AS new_postings, \
             (SELECT COUNT(*) FROM removed_tombstones \
              WHERE removed_at >= d AND removed_at < d + INTERVAL '1 day') AS removed_postings \
         FROM generate_series($1::timestamptz, $2::timestamptz, INTERVAL '1 day') AS d \
         ORDER BY d",
    )
    .bind(trend_start)
    .bind(today_start)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| TrendDay {
        day: row.day_start.date_naive(),
        new_postings: row.new_postings,
        removed_postings: row.removed_postings,
    })
    .collect();

    Ok(DashboardStats {
        active_postings: headline.active_postings,
        new_today: headline.new_today,
        removed_today: headline.removed_today,
        source_count: headline.source_count,
        postings_per_url,
        last_failures,
        trend,
    })
}
