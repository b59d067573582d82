//! Fakes shared by the server's unit and route tests.

use std::sync::{Arc, Mutex};

use jobwatch_core::{KeywordFilter, Posting, Schedule};
use jobwatch_notify::{Email, Mailer, NotifyError};
use jobwatch_scraper::{
    CrawlExecutor, CrawlLimits, ExtractError, ExtractedPage, Extractor, ExtractorRegistry,
};
use sqlx::PgPool;
use tokio::sync::Notify;
use url::Url;

use crate::pipeline::SourceRunner;
use crate::stats::DailyStats;

pub fn posting(link: &str) -> Posting {
    Posting {
        title: format!("Role {link}"),
        company: "Acme AG".to_string(),
        location: "Remote".to_string(),
        link: link.to_string(),
    }
}

/// Single-page extractor with a canned answer.
pub enum Fixed {
    Postings(Vec<Posting>),
    Status(u16),
}

impl Fixed {
    pub fn postings(links: &[&str]) -> Arc<dyn Extractor> {
        Arc::new(Fixed::Postings(links.iter().map(|l| posting(l)).collect()))
    }

    pub fn status(status: u16) -> Arc<dyn Extractor> {
        Arc::new(Fixed::Status(status))
    }
}

#[async_trait::async_trait]
impl Extractor for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(
        &self,
        url: &Url,
        _filter: &KeywordFilter,
    ) -> Result<ExtractedPage, ExtractError> {
        match self {
            Fixed::Postings(postings) => Ok(ExtractedPage {
                postings: postings.clone(),
                next_page: None,
            }),
            Fixed::Status(status) => Err(ExtractError::UnexpectedStatus {
                status: *status,
                url: url.to_string(),
            }),
        }
    }
}

/// Extractor that blocks until [`Gate::open`] is called, then returns an
/// empty page.
#[derive(Clone, Default)]
pub struct Gate {
    opened: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extractor(&self) -> Arc<dyn Extractor> {
        Arc::new(self.clone())
    }

    pub fn open(&self) {
        self.opened.notify_one();
    }
}

#[async_trait::async_trait]
impl Extractor for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    async fn extract(
        &self,
        _url: &Url,
        _filter: &KeywordFilter,
    ) -> Result<ExtractedPage, ExtractError> {
        self.opened.notified().await;
        Ok(ExtractedPage::default())
    }
}

/// Keeps every email it is asked to send; optionally fails instead.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Smtp("relay refused".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

pub fn runner_with(
    pool: PgPool,
    extractors: &[(&str, Arc<dyn Extractor>)],
    mailer: Arc<dyn Mailer>,
    operators: &[&str],
) -> Arc<SourceRunner> {
    let mut registry = ExtractorRegistry::new();
    for (pattern, extractor) in extractors {
        registry
            .register(pattern, Arc::clone(extractor))
            .expect("register");
    }
    Arc::new(SourceRunner::new(
        pool,
        CrawlExecutor::new(Arc::new(registry), CrawlLimits::default()),
        mailer,
        operators.iter().map(|s| (*s).to_string()).collect(),
        Arc::new(DailyStats::default()),
    ))
}

pub async fn seed_source(pool: &PgPool, title: &str, url: &str) -> i64 {
    jobwatch_db::create_source(
        pool,
        &jobwatch_db::NewSource {
            title: title.to_string(),
            url: url.to_string(),
            schedule: Schedule::parse("08:15", &["mon", "wed"]).expect("schedule"),
            keywords: vec![],
        },
    )
    .await
    .expect("create source")
    .id
}
