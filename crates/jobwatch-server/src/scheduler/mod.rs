//! Background job scheduler.
//!
//! Source triggers are kept in step with the `sources` table by a poll job
//! that runs every `config_poll_secs`. The digest, cleanup and reset triggers
//! follow the `digest_time` setting and are recreated when it changes.
//! Nothing is persisted: every start rebuilds the triggers from the store.

mod plan;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jobwatch_core::{digest_trigger_times, AppConfig, DigestTriggerTimes, SourceConfig};
use jobwatch_notify::Mailer;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

pub use plan::{plan_source_triggers, TriggerSpec};

use crate::jobs;
use crate::pipeline::{SourceRunner, SourceTarget};
use crate::stats::DailyStats;

struct SourceTrigger {
    job_id: Uuid,
    spec: TriggerSpec,
}

struct AppliedDigest {
    times: DigestTriggerTimes,
    job_ids: Vec<Uuid>,
}

#[derive(Default)]
struct TriggerState {
    sources: HashMap<i64, SourceTrigger>,
    digest: Option<AppliedDigest>,
}

/// Shared handles the system jobs need.
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub runner: Arc<SourceRunner>,
    pub mailer: Arc<dyn Mailer>,
    pub stats: Arc<DailyStats>,
    pub retention_days: u32,
}

/// Keeps the scheduler's triggers synchronized with the store.
pub struct TriggerSync {
    scheduler: JobScheduler,
    ctx: JobContext,
    state: Mutex<TriggerState>,
}

impl TriggerSync {
    #[must_use]
    pub fn new(scheduler: JobScheduler, ctx: JobContext) -> Self {
        Self {
            scheduler,
            ctx,
            state: Mutex::new(TriggerState::default()),
        }
    }

    /// One reconciliation pass over source and digest triggers.
    pub async fn sync(&self) {
        self.sync_sources().await;
        self.sync_digest().await;
    }

    async fn sync_sources(&self) {
        let rows = match jobwatch_db::list_sources(&self.ctx.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "scheduler: failed to load sources; keeping current triggers");
                return;
            }
        };

        let mut desired = Vec::with_capacity(rows.len());
        let mut unparsed = HashSet::new();
        for row in &rows {
            match row.to_config() {
                Ok(config) => desired.push(config),
                Err(e) => {
                    tracing::warn!(
                        source_id = row.id,
                        error = %e,
                        "scheduler: source has an invalid schedule; leaving its trigger unchanged"
                    );
                    unparsed.insert(row.id);
                }
            }
        }

        let mut state = self.state.lock().await;
        let current: HashMap<i64, TriggerSpec> = state
            .sources
            .iter()
            .map(|(id, trigger)| (*id, trigger.spec.clone()))
            .collect();
        let plan = plan_source_triggers(&current, &desired, &unparsed);
        if plan.is_empty() {
            return;
        }

        for id in &plan.remove {
            if let Some(trigger) = state.sources.remove(id) {
                self.remove_job(trigger.job_id).await;
                tracing::info!(source_id = id, "scheduler: removed source trigger");
            }
        }
        for source in plan.replace {
            if let Some(old) = state.sources.remove(&source.id) {
                self.remove_job(old.job_id).await;
            }
            self.add_source_trigger(&mut state, source).await;
        }
        for source in plan.add {
            self.add_source_trigger(&mut state, source).await;
        }
    }

    async fn add_source_trigger(&self, state: &mut TriggerState, source: &SourceConfig) {
        let spec = TriggerSpec::from(source);
        let target = SourceTarget::from(source);
        let runner = Arc::clone(&self.ctx.runner);

        let job = Job::new_async(spec.cron.as_str(), move |_uuid, _lock| {
            let runner = Arc::clone(&runner);
            let target = target.clone();
            Box::pin(async move {
                // The run continues on its own task.
                let _ = runner.dispatch(target);
            })
        });

        let added = match job {
            Ok(job) => self.scheduler.add(job).await,
            Err(e) => Err(e),
        };
        match added {
            Ok(job_id) => {
                tracing::info!(source_id = source.id, cron = %spec.cron, "scheduler: source trigger scheduled");
                state.sources.insert(source.id, SourceTrigger { job_id, spec });
            }
            Err(e) => {
                tracing::error!(
                    source_id = source.id,
                    cron = %spec.cron,
                    error = %e,
                    "scheduler: failed to schedule source trigger"
                );
            }
        }
    }

    async fn sync_digest(&self) {
        let time = match jobwatch_db::get_digest_time(&self.ctx.pool).await {
            Ok(time) => time,
            Err(e) => {
                tracing::warn!(error = %e, "scheduler: cannot read digest time; keeping current digest triggers");
                return;
            }
        };
        let times = digest_trigger_times(time);

        let mut state = self.state.lock().await;
        if state.digest.as_ref().is_some_and(|d| d.times == times) {
            return;
        }
        if let Some(old) = state.digest.take() {
            for job_id in old.job_ids {
                self.remove_job(job_id).await;
            }
        }

        match self.add_digest_jobs(times).await {
            Ok(job_ids) => {
                tracing::info!(
                    digest = %times.digest,
                    cleanup = %times.cleanup,
                    reset = %times.reset,
                    "scheduler: digest triggers scheduled"
                );
                state.digest = Some(AppliedDigest { times, job_ids });
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduler: failed to schedule digest triggers; retrying next poll");
            }
        }
    }

    async fn add_digest_jobs(
        &self,
        times: DigestTriggerTimes,
    ) -> Result<Vec<Uuid>, JobSchedulerError> {
        let ctx = self.ctx.clone();
        let digest = Job::new_async(times.digest_cron().as_str(), move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                jobs::send_digest(&ctx.pool, ctx.mailer.as_ref(), &ctx.stats, Utc::now()).await;
            })
        })?;

        let ctx = self.ctx.clone();
        let cleanup = Job::new_async(times.cleanup_cron().as_str(), move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                jobs::purge_expired(&ctx.pool, ctx.retention_days, Utc::now()).await;
            })
        })?;

        let stats = Arc::clone(&self.ctx.stats);
        let reset = Job::new_async(times.reset_cron().as_str(), move |_uuid, _lock| {
            let stats = Arc::clone(&stats);
            Box::pin(async move {
                jobs::reset_daily_stats(&stats);
            })
        })?;

        let mut job_ids = Vec::with_capacity(3);
        for job in [digest, cleanup, reset] {
            match self.scheduler.add(job).await {
                Ok(id) => job_ids.push(id),
                Err(e) => {
                    for id in job_ids {
                        self.remove_job(id).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(job_ids)
    }

    async fn remove_job(&self, job_id: Uuid) {
        if let Err(e) = self.scheduler.remove(&job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "scheduler: failed to remove job");
        }
    }

    #[cfg(test)]
    async fn source_trigger_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.state.lock().await.sources.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[cfg(test)]
    async fn applied_digest_times(&self) -> Option<DigestTriggerTimes> {
        self.state.lock().await.digest.as_ref().map(|d| d.times)
    }
}

/// Builds and starts the background job scheduler.
///
/// Runs one synchronization pass before starting so triggers exist from the
/// first tick, then registers the poll job. The returned [`JobScheduler`]
/// must be kept alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// poll job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    ctx: JobContext,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let sync = Arc::new(TriggerSync::new(scheduler.clone(), ctx));
    sync.sync().await;

    let poll_every = Duration::from_secs(config.config_poll_secs);
    let poll = Job::new_repeated_async(poll_every, move |_uuid, _lock| {
        let sync = Arc::clone(&sync);
        Box::pin(async move {
            sync.sync().await;
        })
    })?;
    scheduler.add(poll).await?;

    scheduler.start().await?;
    tracing::info!(
        poll_secs = config.config_poll_secs,
        "scheduler: started"
    );
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{runner_with, seed_source, RecordingMailer};
    use chrono::NaiveTime;

    async fn trigger_sync(pool: &PgPool) -> TriggerSync {
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let runner = runner_with(pool.clone(), &[], Arc::clone(&mailer), &[]);
        let scheduler = JobScheduler::new().await.expect("scheduler");
        TriggerSync::new(
            scheduler,
            JobContext {
                pool: pool.clone(),
                runner,
                mailer,
                stats: Arc::new(DailyStats::default()),
                retention_days: 30,
            },
        )
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn sync_tracks_source_additions_and_deletions(pool: PgPool) {
        let a = seed_source(&pool, "A", "https://a.example/jobs").await;
        let b = seed_source(&pool, "B", "https://b.example/jobs").await;
        let sync = trigger_sync(&pool).await;

        sync.sync().await;
        assert_eq!(sync.source_trigger_ids().await, vec![a, b]);

        jobwatch_db::delete_source(&pool, a).await.unwrap();
        let c = seed_source(&pool, "C", "https://c.example/jobs").await;
        sync.sync().await;
        assert_eq!(sync.source_trigger_ids().await, vec![b, c]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn invalid_stored_schedule_does_not_block_other_sources(pool: PgPool) {
        let a = seed_source(&pool, "A", "https://a.example/jobs").await;
        let b = seed_source(&pool, "B", "https://b.example/jobs").await;
        sqlx::query("UPDATE sources SET schedule_time = '25:99' WHERE id = $1")
            .bind(a)
            .execute(&pool)
            .await
            .unwrap();
        let sync = trigger_sync(&pool).await;

        sync.sync().await;
        assert_eq!(sync.source_trigger_ids().await, vec![b]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn digest_triggers_follow_the_setting(pool: PgPool) {
        let sync = trigger_sync(&pool).await;

        sync.sync().await;
        let applied = sync.applied_digest_times().await.expect("applied");
        assert_eq!(applied.digest, NaiveTime::from_hms_opt(15, 30, 0).unwrap());

        jobwatch_db::set_digest_time(&pool, NaiveTime::from_hms_opt(23, 58, 0).unwrap())
            .await
            .unwrap();
        sync.sync().await;
        let applied = sync.applied_digest_times().await.expect("applied");
        assert_eq!(applied.cleanup, NaiveTime::from_hms_opt(0, 3, 0).unwrap());
        assert_eq!(applied.reset, NaiveTime::from_hms_opt(0, 8, 0).unwrap());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn malformed_digest_setting_keeps_previous_triggers(pool: PgPool) {
        let sync = trigger_sync(&pool).await;
        sync.sync().await;
        let before = sync.applied_digest_times().await;

        jobwatch_db::set_setting(&pool, jobwatch_db::DIGEST_TIME_KEY, "half past three")
            .await
            .unwrap();
        sync.sync().await;
        assert_eq!(sync.applied_digest_times().await, before);
    }
}
