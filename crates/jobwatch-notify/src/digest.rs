//! Daily digest of new and removed postings.

use chrono::NaiveDate;
use minijinja::context;
use serde::Serialize;

use crate::mailer::RenderedEmail;
use crate::{templates, NotifyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestEntry {
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
}

/// Postings of one source, in the order they were supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestSection {
    pub source_title: String,
    pub postings: Vec<DigestEntry>,
}

impl DigestSection {
    /// Group `(source_title, entry)` pairs by source title. Sections appear in
    /// order of first occurrence; entries keep their relative order.
    pub fn group<I>(rows: I) -> Vec<DigestSection>
    where
        I: IntoIterator<Item = (String, DigestEntry)>,
    {
        let mut sections: Vec<DigestSection> = Vec::new();
        for (source_title, entry) in rows {
            match sections.iter_mut().find(|s| s.source_title == source_title) {
                Some(section) => section.postings.push(entry),
                None => sections.push(DigestSection {
                    source_title,
                    postings: vec![entry],
                }),
            }
        }
        sections
    }
}

/// Run counters accumulated since the last daily reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub postings_added: u64,
    pub postings_removed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub date: NaiveDate,
    pub new_postings: Vec<DigestSection>,
    pub removed: Vec<DigestSection>,
    pub summary: Option<RunSummary>,
}

impl Digest {
    /// True when there is nothing new and nothing removed to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_postings.is_empty() && self.removed.is_empty()
    }

    fn count(sections: &[DigestSection]) -> usize {
        sections.iter().map(|s| s.postings.len()).sum()
    }

    #[must_use]
    pub fn new_count(&self) -> usize {
        Self::count(&self.new_postings)
    }

    #[must_use]
    pub fn removed_count(&self) -> usize {
        Self::count(&self.removed)
    }
}

/// Render the digest as an HTML body with a plain-text alternative.
///
/// An empty digest still renders, as a "no activity" notice.
///
/// # Errors
///
/// Returns [`NotifyError::Template`] if rendering fails.
pub fn render_digest(digest: &Digest) -> Result<RenderedEmail, NotifyError> {
    let date = digest.date.format("%Y-%m-%d").to_string();
    let ctx = context! {
        date => &date,
        is_empty => digest.is_empty(),
        new_postings => &digest.new_postings,
        removed => &digest.removed,
        summary => &digest.summary,
    };

    let subject = if digest.is_empty() {
        format!("Job digest {date}: no activity")
    } else {
        format!(
            "Job digest {date}: {} new, {} removed",
            digest.new_count(),
            digest.removed_count()
        )
    };

    Ok(RenderedEmail {
        subject,
        html: templates::render("digest.html", &ctx)?,
        text: templates::render("digest.txt", &ctx)?,
    })
}
