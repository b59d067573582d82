//! Job postings and the live-vs-fresh diff used by reconciliation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A posting as returned by an extractor for one page.
///
/// `link` is the natural identity of a posting within a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
}

/// OR-matched, case-insensitive substring filter over posting titles.
///
/// An empty keyword set matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    needles: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let needles = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { needles }
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        if self.needles.is_empty() {
            return true;
        }
        let haystack = text.to_lowercase();
        self.needles.iter().any(|n| haystack.contains(n.as_str()))
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.needles
    }
}

/// Outcome of diffing currently-live rows against a fresh crawl result.
#[derive(Debug)]
pub struct PostingDiff<T> {
    /// Postings whose link was not live before, in crawl order.
    pub inserted: Vec<Posting>,
    /// Number of fresh postings that matched a live row.
    pub confirmed: usize,
    /// Live rows whose link was not seen in the fresh result.
    pub removed: Vec<T>,
}

/// Diff `live` rows against `fresh` postings by link.
///
/// Live rows are loaded into a map keyed by link. Each fresh posting either
/// confirms (and removes) its map entry or becomes an insert. Whatever is left
/// in the map is the removed set. Duplicate links in `fresh` collapse to the
/// first occurrence. Confirmed rows are never updated in place.
pub fn diff_postings<T, F>(live: Vec<T>, link_of: F, fresh: &[Posting]) -> PostingDiff<T>
where
    F: Fn(&T) -> &str,
{
    let mut remaining: HashMap<String, T> = live
        .into_iter()
        .map(|row| (link_of(&row).to_string(), row))
        .collect();

    let mut seen: HashSet<&str> = HashSet::with_capacity(fresh.len());
    let mut inserted = Vec::new();
    let mut confirmed = 0usize;

    for posting in fresh {
        if !seen.insert(posting.link.as_str()) {
            continue;
        }
        if remaining.remove(posting.link.as_str()).is_some() {
            confirmed += 1;
        } else {
            inserted.push(posting.clone());
        }
    }

    let mut removed: Vec<T> = remaining.into_values().collect();
    removed.sort_by(|a, b| link_of(a).cmp(link_of(b)));

    PostingDiff {
        inserted,
        confirmed,
        removed,
    }
}
