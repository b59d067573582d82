//! JSON-pointer extractor for listing endpoints that return JSON.

use std::sync::Arc;

use async_trait::async_trait;
use jobwatch_core::{JsonPointers, KeywordFilter, Posting};
use serde_json::Value;
use url::Url;

use crate::error::ExtractError;
use crate::extractor::{clean_text, ExtractedPage, Extractor};
use crate::fetch::HttpFetcher;

pub struct JsonExtractor {
    name: String,
    pointers: JsonPointers,
    fetcher: Arc<HttpFetcher>,
}

impl JsonExtractor {
    #[must_use]
    pub fn new(name: &str, pointers: &JsonPointers, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            name: name.to_string(),
            pointers: pointers.clone(),
            fetcher,
        }
    }

    pub(crate) fn parse_page(
        &self,
        page_url: &Url,
        body: &Value,
        filter: &KeywordFilter,
    ) -> Result<ExtractedPage, ExtractError> {
        let items = body
            .pointer(&self.pointers.items)
            .and_then(Value::as_array)
            .ok_or_else(|| ExtractError::MissingItems {
                url: page_url.to_string(),
                locator: self.pointers.items.clone(),
            })?;

        let mut postings = Vec::with_capacity(items.len());
        for item in items {
            let title = scalar_at(item, &self.pointers.title);
            let raw_link = scalar_at(item, &self.pointers.link);

            let (Some(title), Some(raw_link)) = (title, raw_link) else {
                tracing::debug!(
                    extractor = %self.name,
                    url = %page_url,
                    "skipping item without title or link"
                );
                continue;
            };

            let Some(link) = self.resolve_link(page_url, &raw_link) else {
                tracing::debug!(
                    extractor = %self.name,
                    link = %raw_link,
                    "skipping item with unresolvable link"
                );
                continue;
            };

            if !filter.matches(&title) {
                continue;
            }

            let company = optional_scalar(item, self.pointers.company.as_deref())
                .or_else(|| self.pointers.default_company.clone())
                .unwrap_or_default();
            let location = optional_scalar(item, self.pointers.location.as_deref())
                .or_else(|| self.pointers.default_location.clone())
                .unwrap_or_default();

            postings.push(Posting {
                title,
                company,
                location,
                link,
            });
        }

        let next_page = optional_scalar(body, self.pointers.next.as_deref());

        Ok(ExtractedPage {
            postings,
            next_page,
        })
    }

    /// Absolute links pass through. Relative ones get `link_prefix` when it is
    /// configured, otherwise they are resolved against the page URL.
    fn resolve_link(&self, page_url: &Url, raw: &str) -> Option<String> {
        if Url::parse(raw).is_ok() {
            return Some(raw.to_string());
        }
        match &self.pointers.link_prefix {
            Some(prefix) => Some(format!("{prefix}{raw}")),
            None => page_url.join(raw).ok().map(String::from),
        }
    }
}

#[async_trait]
impl Extractor for JsonExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        url: &Url,
        filter: &KeywordFilter,
    ) -> Result<ExtractedPage, ExtractError> {
        let body = self.fetcher.get_json(url).await?;
        self.parse_page(url, &body, filter)
    }
}

/// String or number at `pointer`, cleaned; `None` for null, missing or blank.
fn scalar_at(value: &Value, pointer: &str) -> Option<String> {
    let text = match value.pointer(pointer)? {
        Value::String(s) => clean_text(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn optional_scalar(value: &Value, pointer: Option<&str>) -> Option<String> {
    pointer.and_then(|p| scalar_at(value, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pointers() -> JsonPointers {
        JsonPointers {
            items: "/data".to_string(),
            title: "/title".to_string(),
            link: "/url".to_string(),
            company: Some("/company/name".to_string()),
            location: Some("/place".to_string()),
            next: Some("/links/next".to_string()),
            link_prefix: None,
            default_company: None,
            default_location: Some("Schweiz".to_string()),
        }
    }

    fn extractor(pointers: &JsonPointers) -> JsonExtractor {
        let fetcher = Arc::new(HttpFetcher::new(5, "jobwatch-test/0.1", 0, 0).unwrap());
        JsonExtractor::new("swissengineering", pointers, fetcher)
    }

    fn page_url() -> Url {
        Url::parse("https://api.example.ch/de/jobs?page=1").unwrap()
    }

    fn body() -> Value {
        json!({
            "data": [
                {"title": "Rust Developer", "url": "/job/1", "company": {"name": "Acme"}, "place": "Bern"},
                {"title": "DevOps Engineer", "url": "https://elsewhere.example/j/2", "company": null},
                {"title": null, "url": "/job/3"},
                {"title": "Chef", "url": "/job/4"}
            ],
            "links": {"next": "https://api.example.ch/de/jobs?page=2"}
        })
    }

    #[test]
    fn extracts_items_with_defaults() {
        let page = extractor(&pointers())
            .parse_page(&page_url(), &body(), &KeywordFilter::default())
            .unwrap();

        assert_eq!(page.postings.len(), 3);
        assert_eq!(page.postings[0].company, "Acme");
        assert_eq!(page.postings[0].location, "Bern");
        assert_eq!(page.postings[0].link, "https://api.example.ch/job/1");
        assert_eq!(page.postings[1].company, "");
        assert_eq!(page.postings[1].location, "Schweiz");
        assert_eq!(page.postings[1].link, "https://elsewhere.example/j/2");
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://api.example.ch/de/jobs?page=2")
        );
    }

    #[test]
    fn link_prefix_applies_to_relative_links_only() {
        let mut ptr = pointers();
        ptr.link_prefix = Some("https://www.example.ch".to_string());
        let page = extractor(&ptr)
            .parse_page(&page_url(), &body(), &KeywordFilter::default())
            .unwrap();
        assert_eq!(page.postings[0].link, "https://www.example.ch/job/1");
        assert_eq!(page.postings[1].link, "https://elsewhere.example/j/2");
    }

    #[test]
    fn keyword_filter_applies_to_title() {
        let page = extractor(&pointers())
            .parse_page(&page_url(), &body(), &KeywordFilter::new(["devops"]))
            .unwrap();
        assert_eq!(page.postings.len(), 1);
        assert_eq!(page.postings[0].title, "DevOps Engineer");
    }

    #[test]
    fn missing_items_array_is_an_error() {
        let err = extractor(&pointers())
            .parse_page(&page_url(), &json!({"results": []}), &KeywordFilter::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingItems { ref locator, .. } if locator == "/data"));
    }

    #[test]
    fn null_next_means_last_page() {
        let page = extractor(&pointers())
            .parse_page(
                &page_url(),
                &json!({"data": [], "links": {"next": null}}),
                &KeywordFilter::default(),
            )
            .unwrap();
        assert!(page.postings.is_empty());
        assert!(page.next_page.is_none());
    }

    #[test]
    fn empty_items_pointer_reads_root_array() {
        let mut ptr = pointers();
        ptr.items = String::new();
        ptr.next = None;
        let page = extractor(&ptr)
            .parse_page(
                &page_url(),
                &json!([{"title": "Rust", "url": "/r"}]),
                &KeywordFilter::default(),
            )
            .unwrap();
        assert_eq!(page.postings.len(), 1);
    }
}
