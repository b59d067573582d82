use thiserror::Error;

/// Failure of a single extractor call. An extractor never reports a fetch or
/// parse problem as an empty page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {url}: {source}")]
    Deserialize {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured list container (JSON pointer or CSS selector) is absent.
    #[error("no item list at \"{locator}\" in response from {url}")]
    MissingItems { url: String, locator: String },
}

/// Problems building the registry from extractor configuration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("extractor '{extractor}' has an invalid '{field}' selector: {reason}")]
    InvalidSelector {
        extractor: String,
        field: &'static str,
        reason: String,
    },

    #[error("duplicate extractor pattern '{0}'")]
    DuplicatePattern(String),

    #[error("HTTP client could not be built: {0}")]
    Client(#[from] reqwest::Error),
}

/// A run-level failure: the crawl started but did not complete.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("extractor '{extractor}' failed on {url}")]
    Extract {
        extractor: String,
        url: String,
        #[source]
        source: ExtractError,
    },

    #[error("extractor '{extractor}' timed out after {secs}s on {url}")]
    PageTimeout {
        extractor: String,
        url: String,
        secs: u64,
    },

    #[error("crawl of {url} exceeded {secs}s")]
    RunTimeout { url: String, secs: u64 },
}
