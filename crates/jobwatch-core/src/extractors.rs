use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// CSS selectors for a listing page rendered as HTML.
///
/// `title`, `link`, `company` and `location` are evaluated relative to each
/// element matched by `item`. The link is read from the `href` attribute of
/// the first element matching `link`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlSelectors {
    /// Container that must be present on every page. When it is missing the
    /// page is an error instead of an empty listing, and `item` is matched
    /// only inside it.
    pub list: Option<String>,
    pub item: String,
    pub title: String,
    pub link: String,
    pub company: Option<String>,
    pub location: Option<String>,
    /// Selector for the pagination anchor; its `href` is the next page.
    pub next: Option<String>,
    pub default_company: Option<String>,
    pub default_location: Option<String>,
}

/// JSON pointers (RFC 6901) for a listing endpoint returning JSON.
///
/// `items` points at the array of postings in the response body; the other
/// pointers are evaluated against each array element, except `next`, which
/// is evaluated against the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonPointers {
    pub items: String,
    pub title: String,
    pub link: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub next: Option<String>,
    /// Prepended to relative links, e.g. `https://jobs.example.com/job/`.
    pub link_prefix: Option<String>,
    pub default_company: Option<String>,
    pub default_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExtractorKind {
    Html(HtmlSelectors),
    Json(JsonPointers),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub name: String,
    /// URL substring that routes a page to this extractor.
    pub pattern: String,
    #[serde(flatten)]
    pub kind: ExtractorKind,
}

#[derive(Debug, Deserialize)]
pub struct ExtractorsFile {
    pub extractors: Vec<ExtractorConfig>,
}

/// Load and validate the extractor configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_extractors(path: &Path) -> Result<ExtractorsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ExtractorsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_extractors(&content)
}

/// Parse and validate extractor configuration from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_extractors(content: &str) -> Result<ExtractorsFile, ConfigError> {
    let file: ExtractorsFile = serde_yaml::from_str(content)?;
    validate_extractors(&file)?;
    Ok(file)
}

fn validate_extractors(file: &ExtractorsFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();
    let mut seen_patterns = HashSet::new();

    for extractor in &file.extractors {
        if extractor.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "extractor name must be non-empty".to_string(),
            ));
        }
        if extractor.pattern.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "extractor '{}' has an empty pattern",
                extractor.name
            )));
        }
        if !seen_names.insert(extractor.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate extractor name: '{}'",
                extractor.name
            )));
        }
        if !seen_patterns.insert(extractor.pattern.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate extractor pattern: '{}' (from extractor '{}')",
                extractor.pattern, extractor.name
            )));
        }

        match &extractor.kind {
            ExtractorKind::Html(sel) => {
                for (field, value) in [
                    ("item", &sel.item),
                    ("title", &sel.title),
                    ("link", &sel.link),
                ] {
                    if value.trim().is_empty() {
                        return Err(ConfigError::Validation(format!(
                            "extractor '{}' has an empty '{field}' selector",
                            extractor.name
                        )));
                    }
                }
            }
            ExtractorKind::Json(ptr) => {
                let pointers = [
                    Some(("items", &ptr.items)),
                    Some(("title", &ptr.title)),
                    Some(("link", &ptr.link)),
                    ptr.company.as_ref().map(|p| ("company", p)),
                    ptr.location.as_ref().map(|p| ("location", p)),
                    ptr.next.as_ref().map(|p| ("next", p)),
                ];
                for (field, value) in pointers.into_iter().flatten() {
                    if !value.is_empty() && !value.starts_with('/') {
                        return Err(ConfigError::Validation(format!(
                            "extractor '{}' has an invalid '{field}' pointer '{value}'; \
                             JSON pointers must be empty or start with '/'",
                            extractor.name
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}
