pub mod error;
pub mod executor;
pub mod extractor;
pub mod fetch;
pub mod html;
pub mod json;
pub mod registry;
mod retry;

pub use error::{CrawlError, ExtractError, RegistryError};
pub use executor::{CrawlExecutor, CrawlLimits, CrawlOutcome, CrawlReport};
pub use extractor::{ExtractedPage, Extractor};
pub use fetch::HttpFetcher;
pub use html::HtmlExtractor;
pub use json::JsonExtractor;
pub use registry::ExtractorRegistry;
