//! Offline unit tests for jobwatch-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Utc;
use jobwatch_core::{AppConfig, Environment, Weekday};
use jobwatch_db::{FailureRow, PoolConfig, ReconcileSummary, SourceRow};

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        extractors_path: PathBuf::from("./config/extractors.yaml"),
        api_keys: vec![],
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        scraper_request_timeout_secs: 30,
        scraper_user_agent: "ua".to_string(),
        scraper_max_retries: 2,
        scraper_retry_backoff_base_secs: 2,
        extractor_timeout_secs: 60,
        crawl_timeout_secs: 600,
        crawl_max_pages: 30,
        config_poll_secs: 60,
        retention_days: 30,
        smtp: None,
        mail_from: "jobwatch@localhost".to_string(),
        operator_emails: vec![],
    }
}

fn source_row(time: &str, days: &[&str]) -> SourceRow {
    SourceRow {
        id: 1,
        title: "Acme".to_string(),
        url: "https://acme.example/jobs".to_string(),
        schedule_time: time.to_string(),
        schedule_days: days.iter().map(|d| (*d).to_string()).collect(),
        keywords: vec!["rust".to_string()],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn source_row_converts_to_config() {
    let config = source_row("08:15", &["wed", "mon"])
        .to_config()
        .expect("valid row");
    assert_eq!(config.id, 1);
    assert_eq!(config.keywords, vec!["rust".to_string()]);
    assert_eq!(
        config.schedule.days,
        BTreeSet::from([Weekday::Mon, Weekday::Wed])
    );
}

#[test]
fn source_row_with_bad_schedule_fails_conversion() {
    assert!(source_row("8h15", &[]).to_config().is_err());
    assert!(source_row("08:15", &["someday"]).to_config().is_err());
}

#[test]
fn reconcile_summary_defaults_to_zero() {
    assert_eq!(
        ReconcileSummary::default(),
        ReconcileSummary {
            inserted: 0,
            confirmed: 0,
            removed: 0
        }
    );
}

/// Compile-time smoke test: confirm that [`FailureRow`] serializes with the
/// fields the failure log API exposes.
#[test]
fn failure_row_serializes_expected_fields() {
    let row = FailureRow {
        id: 1,
        source_id: None,
        source_url: "https://acme.example/jobs".to_string(),
        error_kind: "dispatch_failure".to_string(),
        message: "no extractor".to_string(),
        trace: "no extractor".to_string(),
        failed_at: Utc::now(),
    };
    let json = serde_json::to_value(&row).expect("serialize");
    assert_eq!(json["error_kind"], "dispatch_failure");
    assert!(json["source_id"].is_null());
}
