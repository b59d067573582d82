//! One source run: crawl, then either reconcile the result or record a
//! failure and notify operators.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use jobwatch_core::SourceConfig;
use jobwatch_db::{FailureKind, NewFailure, ReconcileSummary, SourceRow};
use jobwatch_notify::{render_failure, Email, FailureNotice, Mailer};
use jobwatch_scraper::{CrawlExecutor, CrawlOutcome};
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::stats::DailyStats;

/// What a run needs to know about its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTarget {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub keywords: Vec<String>,
}

impl From<&SourceConfig> for SourceTarget {
    fn from(source: &SourceConfig) -> Self {
        Self {
            id: source.id,
            title: source.title.clone(),
            url: source.url.clone(),
            keywords: source.keywords.clone(),
        }
    }
}

impl From<&SourceRow> for SourceTarget {
    fn from(row: &SourceRow) -> Self {
        Self {
            id: row.id,
            title: row.title.clone(),
            url: row.url.clone(),
            keywords: row.keywords.clone(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Reconciled(ReconcileSummary),
    Failed(FailureKind),
}

/// Source ids with a run in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<i64>>>,
}

/// Marks a source as running until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

fn lock(ids: &Mutex<HashSet<i64>>) -> MutexGuard<'_, HashSet<i64>> {
    ids.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InFlight {
    /// Claim `id`. Returns `None` while another guard for `id` is alive.
    #[must_use]
    pub fn try_acquire(&self, id: i64) -> Option<InFlightGuard> {
        if !lock(&self.ids).insert(id) {
            return None;
        }
        Some(InFlightGuard {
            ids: Arc::clone(&self.ids),
            id,
        })
    }

    #[cfg(test)]
    pub fn contains(&self, id: i64) -> bool {
        lock(&self.ids).contains(&id)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.ids).remove(&self.id);
    }
}

/// Render an error and its `source()` chain, one cause per line.
pub fn error_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

/// Runs sources through the crawl and reconciliation pipeline, one at a time
/// per source id.
pub struct SourceRunner {
    pool: PgPool,
    executor: CrawlExecutor,
    mailer: Arc<dyn Mailer>,
    operators: Vec<String>,
    stats: Arc<DailyStats>,
    in_flight: InFlight,
}

impl SourceRunner {
    #[must_use]
    pub fn new(
        pool: PgPool,
        executor: CrawlExecutor,
        mailer: Arc<dyn Mailer>,
        operators: Vec<String>,
        stats: Arc<DailyStats>,
    ) -> Self {
        Self {
            pool,
            executor,
            mailer,
            operators,
            stats,
            in_flight: InFlight::default(),
        }
    }

    #[cfg(test)]
    pub fn is_running(&self, source_id: i64) -> bool {
        self.in_flight.contains(source_id)
    }

    /// Start a run on its own task. Returns `None`, and starts nothing, when
    /// a run for the same source is still in flight.
    pub fn dispatch(self: &Arc<Self>, target: SourceTarget) -> Option<JoinHandle<RunStatus>> {
        let Some(guard) = self.in_flight.try_acquire(target.id) else {
            tracing::warn!(
                source_id = target.id,
                url = %target.url,
                "run: previous run still in flight; skipping"
            );
            return None;
        };

        let runner = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            runner.run(&target).await
        }))
    }

    /// Crawl `target` and apply the outcome. Never panics on store or mail
    /// errors; they are logged.
    pub async fn run(&self, target: &SourceTarget) -> RunStatus {
        let started = Instant::now();
        tracing::info!(source_id = target.id, url = %target.url, "run: starting");

        match self.executor.run(&target.url, &target.keywords).await {
            CrawlOutcome::DispatchFailure { url } => {
                let message = format!("no extractor matches {url}");
                self.record_failure(target, FailureKind::DispatchFailure, &message, &message)
                    .await
            }
            CrawlOutcome::RunError(err) => {
                self.record_failure(
                    target,
                    FailureKind::RunError,
                    &err.to_string(),
                    &error_trace(&err),
                )
                .await
            }
            CrawlOutcome::RunResult(report) => {
                match jobwatch_db::reconcile_postings(
                    &self.pool,
                    target.id,
                    &target.url,
                    &report.postings,
                )
                .await
                {
                    Ok(summary) => {
                        self.stats.record_success(summary);
                        tracing::info!(
                            source_id = target.id,
                            pages = report.pages,
                            inserted = summary.inserted,
                            confirmed = summary.confirmed,
                            removed = summary.removed,
                            elapsed = ?started.elapsed(),
                            "run: reconciled"
                        );
                        RunStatus::Reconciled(summary)
                    }
                    Err(err) => {
                        self.record_failure(
                            target,
                            FailureKind::ReconciliationError,
                            &err.to_string(),
                            &error_trace(&err),
                        )
                        .await
                    }
                }
            }
        }
    }

    async fn record_failure(
        &self,
        target: &SourceTarget,
        kind: FailureKind,
        message: &str,
        trace: &str,
    ) -> RunStatus {
        self.stats.record_failure();
        tracing::error!(
            source_id = target.id,
            url = %target.url,
            kind = %kind,
            error = message,
            "run: failed"
        );

        let failed_at = match jobwatch_db::insert_failure(
            &self.pool,
            &NewFailure {
                source_id: target.id,
                source_url: &target.url,
                kind,
                message,
                trace,
            },
        )
        .await
        {
            Ok(row) => row.failed_at,
            Err(e) => {
                tracing::error!(source_id = target.id, error = %e, "run: failed to persist failure record");
                Utc::now()
            }
        };

        self.notify_operators(&FailureNotice {
            source_id: target.id,
            source_title: target.title.clone(),
            source_url: target.url.clone(),
            kind: kind.to_string(),
            message: message.to_string(),
            trace: trace.to_string(),
            failed_at,
        })
        .await;

        RunStatus::Failed(kind)
    }

    async fn notify_operators(&self, notice: &FailureNotice) {
        if self.operators.is_empty() {
            tracing::warn!(
                source_id = notice.source_id,
                "run: no operator addresses configured; failure email skipped"
            );
            return;
        }

        let rendered = match render_failure(notice) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!(error = %e, "run: failed to render failure email");
                return;
            }
        };

        let email = Email::new(self.operators.clone(), rendered);
        if let Err(e) = self.mailer.send(&email).await {
            tracing::error!(
                source_id = notice.source_id,
                channel = self.mailer.channel_name(),
                error = %e,
                "run: failed to send failure email"
            );
        }
    }
}
