//! CSS-selector extractor for HTML listing pages.

use std::sync::Arc;

use async_trait::async_trait;
use jobwatch_core::{HtmlSelectors, KeywordFilter, Posting};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ExtractError, RegistryError};
use crate::extractor::{clean_text, ExtractedPage, Extractor};
use crate::fetch::HttpFetcher;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";

pub struct HtmlExtractor {
    name: String,
    list: Option<(String, Selector)>,
    item: Selector,
    title: Selector,
    link: Selector,
    company: Option<Selector>,
    location: Option<Selector>,
    next: Option<Selector>,
    default_company: String,
    default_location: String,
    fetcher: Arc<HttpFetcher>,
}

impl HtmlExtractor {
    /// Compiles every configured selector up front.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSelector`] naming the first selector
    /// that fails to parse.
    pub fn new(
        name: &str,
        selectors: &HtmlSelectors,
        fetcher: Arc<HttpFetcher>,
    ) -> Result<Self, RegistryError> {
        let compile = |field: &'static str, css: &str| {
            Selector::parse(css).map_err(|e| RegistryError::InvalidSelector {
                extractor: name.to_string(),
                field,
                reason: e.to_string(),
            })
        };
        let compile_opt = |field: &'static str, css: Option<&String>| {
            css.map(|c| compile(field, c.as_str())).transpose()
        };

        Ok(Self {
            name: name.to_string(),
            list: selectors
                .list
                .as_ref()
                .map(|css| compile("list", css.as_str()).map(|sel| (css.clone(), sel)))
                .transpose()?,
            item: compile("item", selectors.item.as_str())?,
            title: compile("title", selectors.title.as_str())?,
            link: compile("link", selectors.link.as_str())?,
            company: compile_opt("company", selectors.company.as_ref())?,
            location: compile_opt("location", selectors.location.as_ref())?,
            next: compile_opt("next", selectors.next.as_ref())?,
            default_company: selectors.default_company.clone().unwrap_or_default(),
            default_location: selectors.default_location.clone().unwrap_or_default(),
            fetcher,
        })
    }

    /// Parses a fetched page. Kept synchronous because `scraper::Html` is not
    /// `Send` and must not live across an await point.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingItems`] when a `list` selector is
    /// configured and matches nothing, e.g. on a maintenance page.
    pub(crate) fn parse_page(
        &self,
        page_url: &Url,
        body: &str,
        filter: &KeywordFilter,
    ) -> Result<ExtractedPage, ExtractError> {
        let document = Html::parse_document(body);
        let mut postings = Vec::new();

        let items: Vec<ElementRef<'_>> = match &self.list {
            Some((css, list)) => {
                let containers: Vec<ElementRef<'_>> = document.select(list).collect();
                if containers.is_empty() {
                    return Err(ExtractError::MissingItems {
                        url: page_url.to_string(),
                        locator: css.clone(),
                    });
                }
                containers
                    .into_iter()
                    .flat_map(|c| c.select(&self.item))
                    .collect()
            }
            None => document.select(&self.item).collect(),
        };

        for item in items {
            let title = first_text(item, &self.title);
            let href = item
                .select(&self.link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty());

            let (Some(title), Some(href)) = (title, href) else {
                tracing::debug!(
                    extractor = %self.name,
                    url = %page_url,
                    "skipping item without title or link"
                );
                continue;
            };

            let link = match page_url.join(href) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    tracing::debug!(
                        extractor = %self.name,
                        href,
                        error = %e,
                        "skipping item with unresolvable link"
                    );
                    continue;
                }
            };

            if !filter.matches(&title) {
                continue;
            }

            let company = self
                .company
                .as_ref()
                .and_then(|sel| first_text(item, sel))
                .unwrap_or_else(|| self.default_company.clone());
            let location = self
                .location
                .as_ref()
                .and_then(|sel| first_text(item, sel))
                .unwrap_or_else(|| self.default_location.clone());

            postings.push(Posting {
                title,
                company,
                location,
                link,
            });
        }

        let next_page = self.next.as_ref().and_then(|sel| {
            document
                .select(sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty() && !h.starts_with('#'))
                .map(str::to_string)
        });

        Ok(ExtractedPage {
            postings,
            next_page,
        })
    }
}

#[async_trait]
impl Extractor for HtmlExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        url: &Url,
        filter: &KeywordFilter,
    ) -> Result<ExtractedPage, ExtractError> {
        let body = self.fetcher.get_text(url, ACCEPT_HTML).await?;
        self.parse_page(url, &body, filter)
    }
}

/// Cleaned text of the first element under `scope` matching `selector`,
/// or `None` when nothing matches or the text is blank.
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}
