mod api;
mod jobs;
mod middleware;
mod pipeline;
mod scheduler;
mod stats;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jobwatch_core::{AppConfig, Environment};
use jobwatch_notify::{LogMailer, Mailer, SmtpMailer};
use jobwatch_scraper::{CrawlExecutor, CrawlLimits, ExtractorRegistry, HttpFetcher};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
    pipeline::SourceRunner,
    scheduler::JobContext,
    stats::DailyStats,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = jobwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = jobwatch_db::PoolConfig::from_app_config(&config);
    let pool = jobwatch_db::connect_pool(&config.database_url, pool_config).await?;
    jobwatch_db::run_migrations(&pool).await?;

    let executor = build_executor(&config)?;
    let mailer = build_mailer(&config)?;
    let stats = Arc::new(DailyStats::default());
    let runner = Arc::new(SourceRunner::new(
        pool.clone(),
        executor,
        Arc::clone(&mailer),
        config.operator_emails.clone(),
        Arc::clone(&stats),
    ));

    let mut scheduler = scheduler::build_scheduler(
        JobContext {
            pool: pool.clone(),
            runner: Arc::clone(&runner),
            mailer,
            stats,
            retention_days: config.retention_days,
        },
        &config,
    )
    .await?;

    let auth = AuthState::from_keys(&config.api_keys, config.env == Environment::Development)?;
    let app = build_app(AppState { pool, runner }, auth);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "server: listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

fn build_executor(config: &AppConfig) -> anyhow::Result<CrawlExecutor> {
    let extractors = jobwatch_core::load_extractors(&config.extractors_path)?;
    let fetcher = Arc::new(
        HttpFetcher::new(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_secs,
        )
        .context("failed to build HTTP client")?,
    );
    let registry = ExtractorRegistry::from_config(&extractors, &fetcher)?;
    tracing::info!(
        path = %config.extractors_path.display(),
        extractors = registry.len(),
        "registry: loaded"
    );

    let limits = CrawlLimits {
        max_pages: config.crawl_max_pages,
        page_timeout: Duration::from_secs(config.extractor_timeout_secs),
        run_timeout: Duration::from_secs(config.crawl_timeout_secs),
    };
    Ok(CrawlExecutor::new(Arc::new(registry), limits))
}

fn build_mailer(config: &AppConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpMailer::from_config(smtp, &config.mail_from)?)),
        None if config.env == Environment::Development => {
            tracing::warn!("SMTP_HOST not set; emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
        None => anyhow::bail!("SMTP_HOST must be set outside development"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
