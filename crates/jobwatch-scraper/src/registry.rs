//! URL-pattern routing from a page URL to its extractor.

use std::sync::Arc;

use jobwatch_core::{ExtractorKind, ExtractorsFile};

use crate::error::RegistryError;
use crate::extractor::Extractor;
use crate::fetch::HttpFetcher;
use crate::html::HtmlExtractor;
use crate::json::JsonExtractor;

struct Entry {
    pattern: String,
    extractor: Arc<dyn Extractor>,
}

/// Maps URL substrings to extractors. The longest matching pattern wins;
/// among equally long matches the first registered entry wins.
#[derive(Default)]
pub struct ExtractorRegistry {
    entries: Vec<Entry>,
}

impl ExtractorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one extractor per configured entry, all sharing `fetcher`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for an invalid CSS selector or a duplicate
    /// pattern.
    pub fn from_config(
        file: &ExtractorsFile,
        fetcher: &Arc<HttpFetcher>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for config in &file.extractors {
            let extractor: Arc<dyn Extractor> = match &config.kind {
                ExtractorKind::Html(selectors) => Arc::new(HtmlExtractor::new(
                    &config.name,
                    selectors,
                    Arc::clone(fetcher),
                )?),
                ExtractorKind::Json(pointers) => Arc::new(JsonExtractor::new(
                    &config.name,
                    pointers,
                    Arc::clone(fetcher),
                )),
            };
            registry.register(&config.pattern, extractor)?;
        }
        Ok(registry)
    }

    /// Adds an extractor for `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePattern`] if `pattern` is already
    /// registered.
    pub fn register(
        &mut self,
        pattern: &str,
        extractor: Arc<dyn Extractor>,
    ) -> Result<(), RegistryError> {
        if self.entries.iter().any(|e| e.pattern == pattern) {
            return Err(RegistryError::DuplicatePattern(pattern.to_string()));
        }
        self.entries.push(Entry {
            pattern: pattern.to_string(),
            extractor,
        });
        Ok(())
    }

    /// Returns the extractor responsible for `url`, if any.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Arc<dyn Extractor>> {
        let mut best: Option<&Entry> = None;
        for entry in &self.entries {
            if !url.contains(entry.pattern.as_str()) {
                continue;
            }
            if best.is_none_or(|b| entry.pattern.len() > b.pattern.len()) {
                best = Some(entry);
            }
        }
        best.map(|e| Arc::clone(&e.extractor))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
