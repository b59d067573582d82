//! Daily system jobs: digest delivery, retention cleanup and the statistics
//! reset.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use jobwatch_db::{DbError, DigestPostingRow, PurgeSummary, TombstoneRow};
use jobwatch_notify::{render_digest, Digest, DigestEntry, DigestSection, Email, Mailer};
use sqlx::PgPool;

use crate::stats::DailyStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestStatus {
    Sent {
        new_postings: usize,
        removed: usize,
        marked: u64,
    },
    NoRecipients,
    Failed,
}

/// A composed digest and the ids of the tombstones it reports.
#[derive(Debug)]
pub struct ComposedDigest {
    pub digest: Digest,
    pub tombstone_ids: Vec<i64>,
}

fn posting_entry(row: DigestPostingRow) -> (String, DigestEntry) {
    (
        row.source_title,
        DigestEntry {
            title: row.title,
            company: row.company,
            location: row.location,
            link: row.link,
        },
    )
}

/// Section title for tombstones whose source has since been deleted.
pub const UNKNOWN_SOURCE: &str = "Unknown source";

fn tombstone_entry(row: TombstoneRow) -> (String, DigestEntry) {
    (
        row.source_title
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        DigestEntry {
            title: row.title,
            company: row.company,
            location: row.location,
            link: row.link,
        },
    )
}

/// Read postings first seen on the UTC date of `now` and every unnotified
/// tombstone.
///
/// # Errors
///
/// Returns [`DbError`] if either read fails.
pub async fn compose_digest(
    pool: &PgPool,
    stats: &DailyStats,
    now: DateTime<Utc>,
) -> Result<ComposedDigest, DbError> {
    let today = now.date_naive();
    let since = today.and_time(NaiveTime::MIN).and_utc();

    let new_rows = jobwatch_db::list_postings_first_seen_since(pool, since).await?;
    let tombstones = jobwatch_db::list_pending_tombstones(pool).await?;
    let tombstone_ids = tombstones.iter().map(|t| t.id).collect();

    Ok(ComposedDigest {
        digest: Digest {
            date: today,
            new_postings: DigestSection::group(new_rows.into_iter().map(posting_entry)),
            removed: DigestSection::group(tombstones.into_iter().map(tombstone_entry)),
            summary: Some(stats.snapshot()),
        },
        tombstone_ids,
    })
}

/// Compose, send and acknowledge the daily digest.
///
/// Tombstones are marked notified only after the relay accepts the message,
/// and only those that were part of it.
pub async fn send_digest(
    pool: &PgPool,
    mailer: &dyn Mailer,
    stats: &DailyStats,
    now: DateTime<Utc>,
) -> DigestStatus {
    let recipients = match jobwatch_db::list_recipient_emails(pool).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "digest: failed to load recipients");
            return DigestStatus::Failed;
        }
    };
    if recipients.is_empty() {
        tracing::warn!("digest: no recipients configured; skipping");
        return DigestStatus::NoRecipients;
    }

    let composed = match compose_digest(pool, stats, now).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "digest: failed to compose");
            return DigestStatus::Failed;
        }
    };
    let rendered = match render_digest(&composed.digest) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "digest: failed to render");
            return DigestStatus::Failed;
        }
    };

    let email = Email::new(recipients, rendered);
    if let Err(e) = mailer.send(&email).await {
        tracing::error!(
            channel = mailer.channel_name(),
            error = %e,
            pending = composed.tombstone_ids.len(),
            "digest: send failed; removed postings stay pending"
        );
        return DigestStatus::Failed;
    }

    let marked =
        match jobwatch_db::mark_tombstones_notified(pool, &composed.tombstone_ids).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "digest: sent but failed to mark tombstones notified");
                0
            }
        };

    let status = DigestStatus::Sent {
        new_postings: composed.digest.new_count(),
        removed: composed.digest.removed_count(),
        marked,
    };
    tracing::info!(
        recipients = email.to.len(),
        new_postings = composed.digest.new_count(),
        removed = composed.digest.removed_count(),
        marked,
        "digest: sent"
    );
    status
}

/// Delete notified tombstones and failure records older than the retention
/// window.
pub async fn purge_expired(
    pool: &PgPool,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Option<PurgeSummary> {
    let cutoff = now - TimeDelta::days(i64::from(retention_days));
    match jobwatch_db::purge_expired(pool, cutoff).await {
        Ok(summary) => {
            tracing::info!(
                tombstones = summary.tombstones,
                failures = summary.failures,
                %cutoff,
                "cleanup: purged expired records"
            );
            Some(summary)
        }
        Err(e) => {
            tracing::error!(error = %e, "cleanup: purge failed");
            None
        }
    }
}

pub fn reset_daily_stats(stats: &DailyStats) {
    let previous = stats.reset();
    tracing::info!(
        runs_succeeded = previous.runs_succeeded,
        runs_failed = previous.runs_failed,
        postings_added = previous.postings_added,
        postings_removed = previous.postings_removed,
        "reset: daily run statistics cleared"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{posting, seed_source, RecordingMailer};

    async fn seed_one_removal(pool: &PgPool) -> i64 {
        let id = seed_source(pool, "Acme", "https://acme.example/jobs").await;
        let url = "https://acme.example/jobs";
        jobwatch_db::reconcile_postings(pool, id, url, &[posting("/j1"), posting("/j2")])
            .await
            .unwrap();
        jobwatch_db::reconcile_postings(pool, id, url, &[posting("/j2")])
            .await
            .unwrap();
        id
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn digest_is_skipped_without_recipients(pool: PgPool) {
        seed_one_removal(&pool).await;
        let mailer = RecordingMailer::default();

        let status = send_digest(&pool, &mailer, &DailyStats::default(), Utc::now()).await;

        assert_eq!(status, DigestStatus::NoRecipients);
        assert!(mailer.sent().is_empty());
        assert_eq!(jobwatch_db::list_pending_tombstones(&pool).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn successful_send_marks_reported_tombstones(pool: PgPool) {
        seed_one_removal(&pool).await;
        jobwatch_db::add_recipient(&pool, "team@example.com").await.unwrap();
        let mailer = RecordingMailer::default();

        let status = send_digest(&pool, &mailer, &DailyStats::default(), Utc::now()).await;

        assert_eq!(
            status,
            DigestStatus::Sent {
                new_postings: 1,
                removed: 1,
                marked: 1,
            }
        );
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["team@example.com".to_string()]);
        assert!(sent[0].text.contains("Role /j1"));
        assert!(sent[0].text.contains("Role /j2"));
        assert!(jobwatch_db::list_pending_tombstones(&pool)
            .await
            .unwrap()
            .is_empty());

        // Already-notified removals are not repeated.
        let again = send_digest(&pool, &mailer, &DailyStats::default(), Utc::now()).await;
        assert!(matches!(again, DigestStatus::Sent { removed: 0, .. }));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn failed_send_keeps_tombstones_pending(pool: PgPool) {
        seed_one_removal(&pool).await;
        jobwatch_db::add_recipient(&pool, "team@example.com").await.unwrap();
        let mailer = RecordingMailer::failing();

        let status = send_digest(&pool, &mailer, &DailyStats::default(), Utc::now()).await;

        assert_eq!(status, DigestStatus::Failed);
        assert_eq!(jobwatch_db::list_pending_tombstones(&pool).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn quiet_day_sends_no_activity_notice(pool: PgPool) {
        jobwatch_db::add_recipient(&pool, "team@example.com").await.unwrap();
        let mailer = RecordingMailer::default();

        let status = send_digest(&pool, &mailer, &DailyStats::default(), Utc::now()).await;

        assert_eq!(
            status,
            DigestStatus::Sent {
                new_postings: 0,
                removed: 0,
                marked: 0,
            }
        );
        assert!(mailer.sent()[0].subject.ends_with("no activity"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn postings_from_earlier_days_are_not_new(pool: PgPool) {
        let id = seed_source(&pool, "Acme", "https://acme.example/jobs").await;
        jobwatch_db::reconcile_postings(&pool, id, "https://acme.example/jobs", &[posting("/j1")])
            .await
            .unwrap();

        let tomorrow = Utc::now() + TimeDelta::days(1);
        let composed = compose_digest(&pool, &DailyStats::default(), tomorrow)
            .await
            .unwrap();
        assert!(composed.digest.new_postings.is_empty());
        assert_eq!(composed.digest.date, tomorrow.date_naive());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn tombstones_of_deleted_sources_are_grouped_as_unknown(pool: PgPool) {
        let id = seed_one_removal(&pool).await;
        jobwatch_db::delete_source(&pool, id).await.unwrap();

        let composed = compose_digest(&pool, &DailyStats::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(composed.tombstone_ids.len(), 1);
        assert_eq!(composed.digest.removed[0].source_title, UNKNOWN_SOURCE);
        assert_eq!(
            composed.digest.removed[0].postings[0].link,
            "/j1"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn purge_keeps_unnotified_tombstones(pool: PgPool) {
        seed_one_removal(&pool).await;

        let far_future = Utc::now() + TimeDelta::days(365);
        let summary = purge_expired(&pool, 30, far_future).await.unwrap();

        assert_eq!(summary.tombstones, 0);
        assert_eq!(jobwatch_db::list_pending_tombstones(&pool).await.unwrap().len(), 1);
    }

    #[test]
    fn reset_clears_counters() {
        let stats = DailyStats::default();
        stats.record_failure();
        reset_daily_stats(&stats);
        assert_eq!(stats.snapshot().runs_failed, 0);
    }
}
