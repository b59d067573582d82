//! Bounded multi-page crawl of one source.
//!
//! **All-or-nothing semantics**: a run either yields the complete posting
//! list for every page it visited, or no postings at all. Partial lists would
//! reconcile into spurious removals.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jobwatch_core::{KeywordFilter, Posting};
use url::Url;

use crate::error::CrawlError;
use crate::registry::ExtractorRegistry;

#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    pub max_pages: usize,
    pub page_timeout: Duration,
    pub run_timeout: Duration,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_pages: 30,
            page_timeout: Duration::from_secs(60),
            run_timeout: Duration::from_secs(600),
        }
    }
}

/// Postings collected by a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub postings: Vec<Posting>,
    pub pages: usize,
}

/// Result of one crawl. Only [`CrawlOutcome::RunResult`] may be reconciled.
#[derive(Debug)]
pub enum CrawlOutcome {
    /// No extractor matches `url`; a configuration problem.
    DispatchFailure { url: String },
    /// The crawl started but failed or timed out.
    RunError(CrawlError),
    /// The crawl finished; `postings` may legitimately be empty.
    RunResult(CrawlReport),
}

pub struct CrawlExecutor {
    registry: Arc<ExtractorRegistry>,
    limits: CrawlLimits,
}

impl CrawlExecutor {
    #[must_use]
    pub fn new(registry: Arc<ExtractorRegistry>, limits: CrawlLimits) -> Self {
        Self { registry, limits }
    }

    #[must_use]
    pub fn limits(&self) -> CrawlLimits {
        self.limits
    }

    /// Crawls `start_url`, following next-page links until the last page, a
    /// revisited URL, or the page bound.
    pub async fn run(&self, start_url: &str, keywords: &[String]) -> CrawlOutcome {
        let run_timeout = self.limits.run_timeout;
        match tokio::time::timeout(run_timeout, self.crawl(start_url, keywords)).await {
            Ok(outcome) => outcome,
            Err(_) => CrawlOutcome::RunError(CrawlError::RunTimeout {
                url: start_url.to_string(),
                secs: run_timeout.as_secs(),
            }),
        }
    }

    async fn crawl(&self, start_url: &str, keywords: &[String]) -> CrawlOutcome {
        let filter = KeywordFilter::new(keywords);

        if self.registry.resolve(start_url).is_none() {
            return CrawlOutcome::DispatchFailure {
                url: start_url.to_string(),
            };
        }
        let mut current = match Url::parse(start_url) {
            Ok(url) => url,
            Err(e) => {
                return CrawlOutcome::RunError(CrawlError::InvalidUrl {
                    url: start_url.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let mut visited: HashSet<String> = HashSet::from([current.to_string()]);
        let mut postings: Vec<Posting> = Vec::new();
        let mut pages = 0usize;

        loop {
            let Some(extractor) = self.registry.resolve(current.as_str()) else {
                return CrawlOutcome::DispatchFailure {
                    url: current.to_string(),
                };
            };

            pages += 1;
            let page = match tokio::time::timeout(
                self.limits.page_timeout,
                extractor.extract(&current, &filter),
            )
            .await
            {
                Ok(Ok(page)) => page,
                Ok(Err(source)) => {
                    return CrawlOutcome::RunError(CrawlError::Extract {
                        extractor: extractor.name().to_string(),
                        url: current.to_string(),
                        source,
                    })
                }
                Err(_) => {
                    return CrawlOutcome::RunError(CrawlError::PageTimeout {
                        extractor: extractor.name().to_string(),
                        url: current.to_string(),
                        secs: self.limits.page_timeout.as_secs(),
                    })
                }
            };

            tracing::debug!(
                extractor = extractor.name(),
                url = %current,
                page = pages,
                found = page.postings.len(),
                "extracted page"
            );
            postings.extend(page.postings);

            let Some(raw_next) = page.next_page else {
                break;
            };
            let next = match current.join(&raw_next) {
                Ok(url) => url,
                Err(e) => {
                    return CrawlOutcome::RunError(CrawlError::InvalidUrl {
                        url: raw_next,
                        reason: e.to_string(),
                    })
                }
            };
            if !visited.insert(next.to_string()) {
                tracing::debug!(url = %next, "next page already visited; stopping");
                break;
            }
            if pages >= self.limits.max_pages {
                tracing::warn!(
                    url = start_url,
                    max_pages = self.limits.max_pages,
                    "page bound reached; stopping crawl"
                );
                break;
            }
            current = next;
        }

        CrawlOutcome::RunResult(CrawlReport { postings, pages })
    }
}
