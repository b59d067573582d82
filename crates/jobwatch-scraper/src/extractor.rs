use async_trait::async_trait;
use jobwatch_core::{KeywordFilter, Posting};
use url::Url;

use crate::error::ExtractError;

/// Postings found on one listing page plus the raw next-page reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Already filtered by the source's keywords, in page order.
    pub postings: Vec<Posting>,
    /// Next-page URL as found on the page; may be relative.
    pub next_page: Option<String>,
}

/// Extracts postings from one page of a listing site.
///
/// Implementations must return an error, never an empty page, when the page
/// cannot be fetched or parsed: an empty page reconciles to "every posting
/// was removed".
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, url: &Url, filter: &KeywordFilter)
        -> Result<ExtractedPage, ExtractError>;
}

/// Collapse internal whitespace runs and trim.
pub(crate) fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
